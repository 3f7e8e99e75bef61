//! Database operations for the allocation settings table.

use super::PgSatelliteStore;
use crate::store::SettingsStore;
use crate::Result;
use sqlx::Row;
use std::collections::HashMap;
use tracing::info;

#[async_trait::async_trait]
impl SettingsStore for PgSatelliteStore {
    async fn allocation_values(&self) -> Result<HashMap<String, f64>> {
        let rows = sqlx::query("SELECT key, value FROM allocation_settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("key"), r.get("value")))
            .collect())
    }

    async fn set_allocation_value(&self, key: &str, value: f64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO allocation_settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        info!(key = %key, value = value, "Updated allocation setting");
        Ok(())
    }
}
