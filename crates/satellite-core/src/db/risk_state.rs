//! Database operations for per-bucket risk throttle state.

use super::PgSatelliteStore;
use crate::store::RiskStateStore;
use crate::types::RiskState;
use crate::Result;
use sqlx::Row;
use tracing::debug;

#[async_trait::async_trait]
impl RiskStateStore for PgSatelliteStore {
    async fn get_risk_state(&self, bucket_id: &str) -> Result<Option<RiskState>> {
        let row = sqlx::query(
            r#"
            SELECT bucket_id, cooldown_started_at, reawakening_stage,
                   reawakening_consecutive_wins, updated_at
            FROM satellite_risk_state
            WHERE bucket_id = $1
            "#,
        )
        .bind(bucket_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RiskState {
            bucket_id: r.get("bucket_id"),
            cooldown_started_at: r.get("cooldown_started_at"),
            reawakening_stage: r
                .get::<Option<i32>, _>("reawakening_stage")
                .map(|s| s.max(0) as u32),
            reawakening_consecutive_wins: r.get::<i32, _>("reawakening_consecutive_wins").max(0)
                as u32,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save_risk_state(&self, state: &RiskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO satellite_risk_state (
                bucket_id, cooldown_started_at, reawakening_stage,
                reawakening_consecutive_wins, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (bucket_id) DO UPDATE SET
                cooldown_started_at = EXCLUDED.cooldown_started_at,
                reawakening_stage = EXCLUDED.reawakening_stage,
                reawakening_consecutive_wins = EXCLUDED.reawakening_consecutive_wins,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.bucket_id)
        .bind(&state.cooldown_started_at)
        .bind(state.reawakening_stage.map(|s| s as i32))
        .bind(state.reawakening_consecutive_wins as i32)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(bucket_id = %state.bucket_id, "Saved risk state");
        Ok(())
    }
}
