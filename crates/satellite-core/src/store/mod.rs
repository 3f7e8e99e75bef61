//! Storage traits shared by the ledger, lifecycle and risk services.
//!
//! Two implementations ship with the crate: [`MemorySatelliteStore`] for tests
//! and embedding, and [`crate::db::PgSatelliteStore`] for PostgreSQL. Both give
//! [`LedgerStore::apply`] the same all-or-nothing semantics.

mod memory;

pub use memory::MemorySatelliteStore;

use crate::types::{
    AllocationSettings, Bucket, BucketBalance, BucketTransaction, LedgerEntry, RiskState,
    SatelliteSettings, TransactionFilter, TransactionType,
};
use crate::Result;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Cash capability handed to position tracking.
///
/// Narrow on purpose so the position side can read and move bucket cash
/// without depending on the ledger services.
#[async_trait::async_trait]
pub trait CashManager: Send + Sync {
    /// Balance of one bucket in one currency, zero when no row exists.
    async fn get_cash_balance(&self, bucket_id: &str, currency: &str) -> Result<Decimal>;

    /// currency -> balance for one bucket.
    async fn get_all_cash_balances(&self, bucket_id: &str) -> Result<BTreeMap<String, Decimal>>;

    /// Sum over all buckets for one currency.
    async fn get_total_by_currency(&self, currency: &str) -> Result<Decimal>;

    /// `CASH:<CURRENCY>:<bucket_id>` for every balance row.
    async fn get_all_cash_symbols(&self) -> Result<Vec<String>>;

    /// Apply a signed delta and record it as `transaction_type`. Returns the new balance.
    async fn adjust_cash_balance(
        &self,
        bucket_id: &str,
        currency: &str,
        delta: Decimal,
        transaction_type: TransactionType,
        description: Option<String>,
    ) -> Result<Decimal>;
}

/// Balance rows plus the append-only transaction log.
#[async_trait::async_trait]
pub trait LedgerStore: CashManager {
    async fn get_balance(&self, bucket_id: &str, currency: &str) -> Result<Option<BucketBalance>>;

    /// All balance rows, optionally for a single bucket.
    async fn list_balances(&self, bucket_id: Option<&str>) -> Result<Vec<BucketBalance>>;

    /// Apply every entry and write its transaction row in one unit.
    ///
    /// Any failure (unknown bucket, insufficient funds, storage error) leaves
    /// no balance or transaction changed. Returns the touched rows in entry order.
    async fn apply(&self, entries: &[LedgerEntry]) -> Result<Vec<BucketBalance>>;

    /// Matching transactions, newest first.
    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<BucketTransaction>>;

    /// Delete a satellite together with its balances, transactions, settings
    /// and risk state in one unit. Returns the number of transactions removed.
    ///
    /// Fails with `NotFound` for an unknown satellite. The core bucket is
    /// never purged.
    async fn purge_bucket(&self, bucket_id: &str) -> Result<u64>;
}

/// Bucket rows and per-satellite settings.
#[async_trait::async_trait]
pub trait BucketStore: Send + Sync {
    async fn get_bucket(&self, id: &str) -> Result<Option<Bucket>>;

    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    /// Fails with `AlreadyExists` on a duplicate id.
    async fn insert_bucket(&self, bucket: &Bucket) -> Result<()>;

    /// Insert a satellite and its settings in one unit. Either both rows are
    /// written or neither is.
    async fn insert_satellite(&self, bucket: &Bucket, settings: &SatelliteSettings) -> Result<()>;

    /// Fails with `NotFound` when the bucket does not exist.
    async fn update_bucket(&self, bucket: &Bucket) -> Result<()>;

    /// Delete a satellite and its settings. The core bucket is never deleted.
    async fn delete_bucket(&self, id: &str) -> Result<()>;

    async fn get_settings(&self, satellite_id: &str) -> Result<Option<SatelliteSettings>>;

    async fn save_settings(&self, settings: &SatelliteSettings) -> Result<()>;
}

/// The global allocation key/value table.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn allocation_values(&self) -> Result<HashMap<String, f64>>;

    async fn set_allocation_value(&self, key: &str, value: f64) -> Result<()>;

    /// Snapshot taken once per operation.
    async fn allocation_settings(&self) -> Result<AllocationSettings> {
        Ok(AllocationSettings::from_values(
            &self.allocation_values().await?,
        ))
    }
}

/// Per-bucket cooldown and reawakening state.
#[async_trait::async_trait]
pub trait RiskStateStore: Send + Sync {
    async fn get_risk_state(&self, bucket_id: &str) -> Result<Option<RiskState>>;

    async fn save_risk_state(&self, state: &RiskState) -> Result<()>;
}

/// Everything the services need from one backend.
pub trait SatelliteStore: BucketStore + LedgerStore + SettingsStore + RiskStateStore {}

impl<T> SatelliteStore for T where T: BucketStore + LedgerStore + SettingsStore + RiskStateStore {}
