//! Database operations for buckets and satellite settings.

use super::PgSatelliteStore;
use crate::store::BucketStore;
use crate::types::{
    Bucket, BucketStatus, BucketType, DividendHandling, SatelliteSettings, CORE_BUCKET_ID,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Database row for buckets.
#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    id: String,
    name: String,
    #[sqlx(rename = "type")]
    bucket_type: String,
    notes: Option<String>,
    target_pct: Option<f64>,
    min_pct: Option<f64>,
    max_pct: Option<f64>,
    status: String,
    consecutive_losses: i32,
    max_consecutive_losses: i32,
    high_water_mark: Decimal,
    high_water_mark_date: Option<DateTime<Utc>>,
    loss_streak_paused_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BucketRow {
    fn into_bucket(self) -> Result<Bucket> {
        let bucket_type = BucketType::parse(&self.bucket_type).ok_or_else(|| Error::Config {
            message: format!("unknown bucket type '{}' for {}", self.bucket_type, self.id),
        })?;
        let status = BucketStatus::parse(&self.status).ok_or_else(|| Error::Config {
            message: format!("unknown bucket status '{}' for {}", self.status, self.id),
        })?;

        Ok(Bucket {
            id: self.id,
            name: self.name,
            bucket_type,
            notes: self.notes,
            status,
            target_pct: self.target_pct,
            min_pct: self.min_pct,
            max_pct: self.max_pct,
            consecutive_losses: self.consecutive_losses.max(0) as u32,
            max_consecutive_losses: self.max_consecutive_losses.max(0) as u32,
            high_water_mark: self.high_water_mark,
            high_water_mark_date: self.high_water_mark_date,
            loss_streak_paused_at: self.loss_streak_paused_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database row for satellite settings.
#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    satellite_id: String,
    preset: Option<String>,
    risk_appetite: f64,
    hold_duration: f64,
    entry_style: f64,
    position_spread: f64,
    profit_taking: f64,
    trailing_stops: bool,
    follow_regime: bool,
    auto_harvest: bool,
    pause_high_volatility: bool,
    dividend_handling: String,
    risk_free_rate: f64,
    sortino_mar: f64,
    evaluation_period_days: i32,
    volatility_window: i32,
}

impl SettingsRow {
    fn into_settings(self) -> SatelliteSettings {
        let dividend_handling =
            DividendHandling::parse(&self.dividend_handling).unwrap_or_else(|| {
                warn!(
                    satellite_id = %self.satellite_id,
                    value = %self.dividend_handling,
                    "Unknown dividend handling, using default"
                );
                DividendHandling::default()
            });

        SatelliteSettings {
            satellite_id: self.satellite_id,
            preset: self.preset,
            risk_appetite: self.risk_appetite,
            hold_duration: self.hold_duration,
            entry_style: self.entry_style,
            position_spread: self.position_spread,
            profit_taking: self.profit_taking,
            trailing_stops: self.trailing_stops,
            follow_regime: self.follow_regime,
            auto_harvest: self.auto_harvest,
            pause_high_volatility: self.pause_high_volatility,
            dividend_handling,
            risk_free_rate: self.risk_free_rate,
            sortino_mar: self.sortino_mar,
            evaluation_period_days: self.evaluation_period_days.max(1) as u32,
            volatility_window: self.volatility_window.max(1) as u32,
        }
    }
}

const BUCKET_COLUMNS: &str = r#"
    id, name, type, notes, target_pct, min_pct, max_pct, status,
    consecutive_losses, max_consecutive_losses, high_water_mark,
    high_water_mark_date, loss_streak_paused_at, created_at, updated_at
"#;

#[async_trait::async_trait]
impl BucketStore for PgSatelliteStore {
    async fn get_bucket(&self, id: &str) -> Result<Option<Bucket>> {
        let row: Option<BucketRow> =
            sqlx::query_as(&format!("SELECT {BUCKET_COLUMNS} FROM buckets WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(BucketRow::into_bucket).transpose()
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let rows: Vec<BucketRow> = sqlx::query_as(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets ORDER BY type, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BucketRow::into_bucket).collect()
    }

    async fn insert_bucket(&self, bucket: &Bucket) -> Result<()> {
        insert_bucket_row(&self.pool, bucket).await?;
        debug!(bucket_id = %bucket.id, "Inserted bucket");
        Ok(())
    }

    async fn insert_satellite(&self, bucket: &Bucket, settings: &SatelliteSettings) -> Result<()> {
        if settings.satellite_id != bucket.id {
            return Err(Error::validation(format!(
                "settings for {} cannot be created with bucket {}",
                settings.satellite_id, bucket.id
            )));
        }

        let mut tx = self.pool.begin().await?;
        insert_bucket_row(&mut *tx, bucket).await?;
        upsert_settings_row(&mut *tx, settings).await?;
        tx.commit().await?;

        debug!(bucket_id = %bucket.id, "Inserted satellite with settings");
        Ok(())
    }

    async fn update_bucket(&self, bucket: &Bucket) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE buckets SET
                name = $2,
                notes = $3,
                target_pct = $4,
                min_pct = $5,
                max_pct = $6,
                status = $7,
                consecutive_losses = $8,
                max_consecutive_losses = $9,
                high_water_mark = $10,
                high_water_mark_date = $11,
                loss_streak_paused_at = $12,
                updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(&bucket.id)
        .bind(&bucket.name)
        .bind(&bucket.notes)
        .bind(bucket.target_pct)
        .bind(bucket.min_pct)
        .bind(bucket.max_pct)
        .bind(bucket.status.as_str())
        .bind(bucket.consecutive_losses as i32)
        .bind(bucket.max_consecutive_losses as i32)
        .bind(bucket.high_water_mark)
        .bind(bucket.high_water_mark_date)
        .bind(bucket.loss_streak_paused_at)
        .bind(bucket.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::bucket_not_found(&bucket.id));
        }
        Ok(())
    }

    async fn delete_bucket(&self, id: &str) -> Result<()> {
        if id == CORE_BUCKET_ID {
            return Err(Error::invalid_transition("Cannot delete core bucket"));
        }

        // Settings and risk state cascade
        let result = sqlx::query("DELETE FROM buckets WHERE id = $1 AND type = 'satellite'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::bucket_not_found(id));
        }
        Ok(())
    }

    async fn get_settings(&self, satellite_id: &str) -> Result<Option<SatelliteSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as(
            r#"
            SELECT satellite_id, preset, risk_appetite, hold_duration, entry_style,
                   position_spread, profit_taking, trailing_stops, follow_regime,
                   auto_harvest, pause_high_volatility, dividend_handling,
                   risk_free_rate, sortino_mar, evaluation_period_days, volatility_window
            FROM satellite_settings
            WHERE satellite_id = $1
            "#,
        )
        .bind(satellite_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SettingsRow::into_settings))
    }

    async fn save_settings(&self, settings: &SatelliteSettings) -> Result<()> {
        upsert_settings_row(&self.pool, settings).await?;
        debug!(satellite_id = %settings.satellite_id, "Saved satellite settings");
        Ok(())
    }
}

async fn insert_bucket_row<'e, E>(executor: E, bucket: &Bucket) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO buckets (
            id, name, type, notes, target_pct, min_pct, max_pct, status,
            consecutive_losses, max_consecutive_losses, high_water_mark,
            high_water_mark_date, loss_streak_paused_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&bucket.id)
    .bind(&bucket.name)
    .bind(bucket.bucket_type.as_str())
    .bind(&bucket.notes)
    .bind(bucket.target_pct)
    .bind(bucket.min_pct)
    .bind(bucket.max_pct)
    .bind(bucket.status.as_str())
    .bind(bucket.consecutive_losses as i32)
    .bind(bucket.max_consecutive_losses as i32)
    .bind(bucket.high_water_mark)
    .bind(bucket.high_water_mark_date)
    .bind(bucket.loss_streak_paused_at)
    .bind(bucket.created_at)
    .bind(bucket.updated_at)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::AlreadyExists {
            kind: "bucket",
            id: bucket.id.clone(),
        });
    }
    Ok(())
}

async fn upsert_settings_row<'e, E>(executor: E, settings: &SatelliteSettings) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO satellite_settings (
            satellite_id, preset, risk_appetite, hold_duration, entry_style,
            position_spread, profit_taking, trailing_stops, follow_regime,
            auto_harvest, pause_high_volatility, dividend_handling,
            risk_free_rate, sortino_mar, evaluation_period_days, volatility_window,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())
        ON CONFLICT (satellite_id) DO UPDATE SET
            preset = EXCLUDED.preset,
            risk_appetite = EXCLUDED.risk_appetite,
            hold_duration = EXCLUDED.hold_duration,
            entry_style = EXCLUDED.entry_style,
            position_spread = EXCLUDED.position_spread,
            profit_taking = EXCLUDED.profit_taking,
            trailing_stops = EXCLUDED.trailing_stops,
            follow_regime = EXCLUDED.follow_regime,
            auto_harvest = EXCLUDED.auto_harvest,
            pause_high_volatility = EXCLUDED.pause_high_volatility,
            dividend_handling = EXCLUDED.dividend_handling,
            risk_free_rate = EXCLUDED.risk_free_rate,
            sortino_mar = EXCLUDED.sortino_mar,
            evaluation_period_days = EXCLUDED.evaluation_period_days,
            volatility_window = EXCLUDED.volatility_window,
            updated_at = NOW()
        "#,
    )
    .bind(&settings.satellite_id)
    .bind(&settings.preset)
    .bind(settings.risk_appetite)
    .bind(settings.hold_duration)
    .bind(settings.entry_style)
    .bind(settings.position_spread)
    .bind(settings.profit_taking)
    .bind(settings.trailing_stops)
    .bind(settings.follow_regime)
    .bind(settings.auto_harvest)
    .bind(settings.pause_high_volatility)
    .bind(settings.dividend_handling.as_str())
    .bind(settings.risk_free_rate)
    .bind(settings.sortino_mar)
    .bind(settings.evaluation_period_days as i32)
    .bind(settings.volatility_window as i32)
    .execute(executor)
    .await?;
    Ok(())
}
