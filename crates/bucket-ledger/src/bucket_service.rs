//! Bucket lifecycle, loss-streak breaker and per-satellite settings.

use rust_decimal::Decimal;
use satellite_core::types::{
    Bucket, BucketStatus, SatelliteSettings, StrategyPreset, CORE_BUCKET_ID,
};
use satellite_core::{
    BucketStore, CashManager, Error, LedgerStore, Result, SatelliteStore, SettingsStore,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::exchange::CurrencyExchangeService;

/// Cash a satellite may still hold per currency and be retired.
const RETIRE_CASH_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Manages bucket state transitions on top of a [`SatelliteStore`].
pub struct BucketService {
    store: Arc<dyn SatelliteStore>,
    exchange: Option<Arc<dyn CurrencyExchangeService>>,
}

impl BucketService {
    pub fn new(store: Arc<dyn SatelliteStore>) -> Self {
        Self {
            store,
            exchange: None,
        }
    }

    /// Enable conversion of foreign-currency cash in [`Self::calculate_bucket_value`].
    pub fn with_exchange(mut self, exchange: Arc<dyn CurrencyExchangeService>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Create the core bucket if it does not exist yet.
    pub async fn ensure_core(&self) -> Result<Bucket> {
        if let Some(core) = self.store.get_bucket(CORE_BUCKET_ID).await? {
            return Ok(core);
        }

        let core = Bucket::core();
        match self.store.insert_bucket(&core).await {
            Ok(()) => {
                info!(bucket_id = CORE_BUCKET_ID, "Created core bucket");
                Ok(core)
            }
            // Lost a race with another initializer
            Err(Error::AlreadyExists { .. }) => self.get_bucket(CORE_BUCKET_ID).await,
            Err(e) => Err(e),
        }
    }

    pub async fn get_bucket(&self, bucket_id: &str) -> Result<Bucket> {
        self.store
            .get_bucket(bucket_id)
            .await?
            .ok_or_else(|| Error::bucket_not_found(bucket_id))
    }

    pub async fn get_core(&self) -> Result<Bucket> {
        self.get_bucket(CORE_BUCKET_ID).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        self.store.list_buckets().await
    }

    pub async fn list_satellites(&self) -> Result<Vec<Bucket>> {
        Ok(self
            .store
            .list_buckets()
            .await?
            .into_iter()
            .filter(Bucket::is_satellite)
            .collect())
    }

    /// Buckets currently in `status`.
    pub async fn list_by_status(&self, status: BucketStatus) -> Result<Vec<Bucket>> {
        Ok(self
            .store
            .list_buckets()
            .await?
            .into_iter()
            .filter(|b| b.status == status)
            .collect())
    }

    /// Register a new satellite with no allocation.
    ///
    /// Starts in research (paper trading) unless `start_in_research` is false,
    /// in which case it starts accumulating. Min/max come from the current
    /// allocation settings and default strategy settings are saved alongside.
    pub async fn create_satellite(
        &self,
        satellite_id: &str,
        name: &str,
        notes: Option<String>,
        start_in_research: bool,
    ) -> Result<Bucket> {
        if satellite_id.trim().is_empty() {
            return Err(Error::validation("satellite id must not be empty"));
        }
        if satellite_id == CORE_BUCKET_ID {
            return Err(Error::AlreadyExists {
                kind: "bucket",
                id: satellite_id.to_string(),
            });
        }

        let allocation = self.store.allocation_settings().await?;
        let status = if start_in_research {
            BucketStatus::Research
        } else {
            BucketStatus::Accumulating
        };

        let mut bucket = Bucket::satellite(
            satellite_id,
            name,
            status,
            allocation.satellite_min_pct,
            allocation.satellite_max_pct,
        );
        bucket.notes = notes;

        self.store
            .insert_satellite(&bucket, &SatelliteSettings::new(satellite_id))
            .await?;

        info!(
            satellite_id = %satellite_id,
            status = %status,
            min_pct = allocation.satellite_min_pct,
            max_pct = allocation.satellite_max_pct,
            "Created satellite"
        );
        Ok(bucket)
    }

    async fn transition<F>(&self, bucket_id: &str, action: &'static str, op: F) -> Result<Bucket>
    where
        F: FnOnce(&mut Bucket) -> Result<()>,
    {
        let mut bucket = self.get_bucket(bucket_id).await?;
        let from = bucket.status;
        op(&mut bucket)?;
        self.store.update_bucket(&bucket).await?;

        info!(
            bucket_id = %bucket_id,
            from = %from,
            to = %bucket.status,
            "Bucket {}",
            action
        );
        Ok(bucket)
    }

    pub async fn activate(&self, satellite_id: &str) -> Result<Bucket> {
        self.transition(satellite_id, "activated", Bucket::activate)
            .await
    }

    pub async fn pause(&self, bucket_id: &str) -> Result<Bucket> {
        self.transition(bucket_id, "paused", Bucket::pause).await
    }

    pub async fn resume(&self, bucket_id: &str) -> Result<Bucket> {
        self.transition(bucket_id, "resumed", Bucket::resume).await
    }

    pub async fn hibernate(&self, bucket_id: &str) -> Result<Bucket> {
        self.transition(bucket_id, "hibernated", Bucket::hibernate)
            .await
    }

    /// Retire a paused satellite whose cash has been moved out.
    pub async fn retire(&self, satellite_id: &str) -> Result<Bucket> {
        let mut bucket = self.get_bucket(satellite_id).await?;
        let mut retired = bucket.clone();
        retired.retire()?;

        let balances = self.store.get_all_cash_balances(satellite_id).await?;
        if let Some((currency, balance)) = balances
            .iter()
            .find(|(_, balance)| balance.abs() > RETIRE_CASH_TOLERANCE)
        {
            return Err(Error::invalid_transition(format!(
                "Satellite {} still has {:.2} {} in cash. Please transfer funds before retiring",
                satellite_id, balance, currency
            )));
        }

        bucket = retired;
        self.store.update_bucket(&bucket).await?;
        info!(satellite_id = %satellite_id, "Retired satellite");
        Ok(bucket)
    }

    /// Remove a retired satellite with its balances, transactions and settings.
    ///
    /// Returns the number of transactions removed.
    pub async fn purge_retired(&self, satellite_id: &str) -> Result<u64> {
        let bucket = self.get_bucket(satellite_id).await?;
        if !bucket.is_satellite() || bucket.status != BucketStatus::Retired {
            return Err(Error::invalid_transition(format!(
                "Only retired satellites can be purged ({} is {})",
                satellite_id, bucket.status
            )));
        }

        let removed = self.store.purge_bucket(satellite_id).await?;

        info!(
            satellite_id = %satellite_id,
            transactions_removed = removed,
            "Purged retired satellite"
        );
        Ok(removed)
    }

    /// Feed a closed trade into the bucket's loss-streak breaker.
    pub async fn record_trade_result(&self, bucket_id: &str, is_win: bool) -> Result<Bucket> {
        let mut bucket = self.get_bucket(bucket_id).await?;
        let tripped = bucket.record_trade_result(is_win);
        self.store.update_bucket(&bucket).await?;

        if tripped {
            warn!(
                bucket_id = %bucket_id,
                consecutive_losses = bucket.consecutive_losses,
                "Circuit breaker triggered - bucket paused"
            );
        } else if is_win {
            debug!(bucket_id = %bucket_id, "Reset consecutive losses after win");
        } else {
            info!(
                bucket_id = %bucket_id,
                consecutive_losses = bucket.consecutive_losses,
                max_consecutive_losses = bucket.max_consecutive_losses,
                "Recorded loss"
            );
        }
        Ok(bucket)
    }

    pub async fn reset_consecutive_losses(&self, bucket_id: &str) -> Result<Bucket> {
        let mut bucket = self.get_bucket(bucket_id).await?;
        bucket.consecutive_losses = 0;
        bucket.loss_streak_paused_at = None;
        self.store.update_bucket(&bucket).await?;
        Ok(bucket)
    }

    /// Persist a new high-water mark when `current_value` exceeds the stored one.
    pub async fn update_high_water_mark(
        &self,
        bucket_id: &str,
        current_value: Decimal,
    ) -> Result<Bucket> {
        let mut bucket = self.get_bucket(bucket_id).await?;
        if bucket.update_high_water_mark(current_value) {
            self.store.update_bucket(&bucket).await?;
            info!(
                bucket_id = %bucket_id,
                high_water_mark = %current_value,
                "Updated high water mark"
            );
        }
        Ok(bucket)
    }

    /// Set a bucket's target allocation. Above max fails, below min only warns.
    pub async fn update_allocation(&self, bucket_id: &str, target_pct: f64) -> Result<Bucket> {
        let mut bucket = self.get_bucket(bucket_id).await?;
        bucket.set_target_pct(target_pct)?;

        if bucket.is_below_min() {
            warn!(
                bucket_id = %bucket_id,
                target_pct,
                min_pct = bucket.min_pct.unwrap_or_default(),
                "Target allocation below minimum"
            );
        }

        self.store.update_bucket(&bucket).await?;
        Ok(bucket)
    }

    pub async fn get_settings(&self, satellite_id: &str) -> Result<Option<SatelliteSettings>> {
        self.store.get_settings(satellite_id).await
    }

    /// Validate and persist strategy settings for a satellite.
    pub async fn save_settings(&self, settings: SatelliteSettings) -> Result<SatelliteSettings> {
        settings.validate()?;

        let bucket = self.get_bucket(&settings.satellite_id).await?;
        if !bucket.is_satellite() {
            return Err(Error::validation(format!(
                "Settings can only be saved for satellites, {} is the core bucket",
                bucket.id
            )));
        }

        self.store.save_settings(&settings).await?;
        info!(
            satellite_id = %settings.satellite_id,
            preset = settings.preset.as_deref().unwrap_or("custom"),
            "Saved satellite settings"
        );
        Ok(settings)
    }

    /// Reset a satellite's settings to defaults overlaid with a named preset.
    pub async fn apply_preset(
        &self,
        satellite_id: &str,
        preset_name: &str,
    ) -> Result<SatelliteSettings> {
        let preset = StrategyPreset::find(preset_name)
            .ok_or_else(|| Error::validation(format!("Invalid preset: {}", preset_name)))?;

        let mut settings = SatelliteSettings::new(satellite_id);
        settings.apply_preset(preset);
        self.save_settings(settings).await
    }

    pub fn list_presets(&self) -> &'static [StrategyPreset] {
        StrategyPreset::all()
    }

    /// Positions value plus the bucket's cash, converted to `base_currency`.
    ///
    /// Non-positive balances are ignored. A currency whose rate cannot be
    /// fetched, or any foreign currency when no exchange service is wired,
    /// is skipped with a warning.
    pub async fn calculate_bucket_value(
        &self,
        bucket_id: &str,
        positions_value: Decimal,
        base_currency: &str,
    ) -> Result<Decimal> {
        let balances = self.store.get_all_cash_balances(bucket_id).await?;

        let mut cash = Decimal::ZERO;
        for (currency, balance) in balances {
            if balance <= Decimal::ZERO {
                continue;
            }
            if currency.eq_ignore_ascii_case(base_currency) {
                cash += balance;
                continue;
            }

            let Some(exchange) = &self.exchange else {
                warn!(
                    bucket_id = %bucket_id,
                    currency = %currency,
                    balance = %balance,
                    "Exchange service not available, skipping currency"
                );
                continue;
            };

            match exchange.get_rate(&currency, base_currency).await {
                Ok(rate) => {
                    debug!(
                        bucket_id = %bucket_id,
                        currency = %currency,
                        rate = %rate,
                        "Converted cash to base currency"
                    );
                    cash += balance * rate;
                }
                Err(e) => {
                    warn!(
                        bucket_id = %bucket_id,
                        currency = %currency,
                        balance = %balance,
                        error = %e,
                        "Failed to get exchange rate, skipping currency"
                    );
                }
            }
        }

        let total = positions_value + cash;
        debug!(
            bucket_id = %bucket_id,
            positions_value = %positions_value,
            cash = %cash,
            total = %total,
            "Calculated bucket value"
        );
        Ok(total)
    }
}
