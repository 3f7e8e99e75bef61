//! In-memory store with the same transactional semantics as PostgreSQL.

use super::{BucketStore, CashManager, LedgerStore, RiskStateStore, SettingsStore};
use crate::cash::cash_symbol;
use crate::types::{
    Bucket, BucketBalance, BucketTransaction, LedgerEntry, RiskState, SatelliteSettings,
    TransactionFilter, TransactionType, CORE_BUCKET_ID,
};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type BalanceKey = (String, String);

#[derive(Default)]
struct MemoryState {
    buckets: BTreeMap<String, Bucket>,
    settings: HashMap<String, SatelliteSettings>,
    balances: BTreeMap<BalanceKey, BucketBalance>,
    transactions: Vec<BucketTransaction>,
    next_transaction_id: i64,
    allocation: HashMap<String, f64>,
    risk: HashMap<String, RiskState>,
}

/// In-memory [`crate::SatelliteStore`].
///
/// A single lock serializes writers; `apply` works on a copy of the balance
/// map and swaps it in only when every entry succeeded.
#[derive(Clone, Default)]
pub struct MemorySatelliteStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemorySatelliteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the allocation settings table.
    pub fn with_allocation(values: HashMap<String, f64>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                allocation: values,
                ..Default::default()
            })),
        }
    }
}

#[async_trait::async_trait]
impl CashManager for MemorySatelliteStore {
    async fn get_cash_balance(&self, bucket_id: &str, currency: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .get(&(bucket_id.to_string(), currency.to_string()))
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_all_cash_balances(&self, bucket_id: &str) -> Result<BTreeMap<String, Decimal>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .filter(|b| b.bucket_id == bucket_id)
            .map(|b| (b.currency.clone(), b.balance))
            .collect())
    }

    async fn get_total_by_currency(&self, currency: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .filter(|b| b.currency == currency)
            .map(|b| b.balance)
            .sum())
    }

    async fn get_all_cash_symbols(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .map(|b| cash_symbol(&b.currency, &b.bucket_id))
            .collect())
    }

    async fn adjust_cash_balance(
        &self,
        bucket_id: &str,
        currency: &str,
        delta: Decimal,
        transaction_type: TransactionType,
        description: Option<String>,
    ) -> Result<Decimal> {
        let entry = LedgerEntry::adjust(bucket_id, currency, delta, transaction_type)
            .with_description(description);
        let rows = self.apply(std::slice::from_ref(&entry)).await?;
        Ok(rows.first().map(|b| b.balance).unwrap_or(Decimal::ZERO))
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemorySatelliteStore {
    async fn get_balance(&self, bucket_id: &str, currency: &str) -> Result<Option<BucketBalance>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .get(&(bucket_id.to_string(), currency.to_string()))
            .cloned())
    }

    async fn list_balances(&self, bucket_id: Option<&str>) -> Result<Vec<BucketBalance>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .filter(|b| bucket_id.map_or(true, |id| b.bucket_id == id))
            .cloned()
            .collect())
    }

    async fn apply(&self, entries: &[LedgerEntry]) -> Result<Vec<BucketBalance>> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let mut balances = state.balances.clone();
        let mut pending = Vec::with_capacity(entries.len());
        let mut touched = Vec::with_capacity(entries.len());

        for entry in entries {
            if !state.buckets.contains_key(&entry.bucket_id) {
                return Err(Error::bucket_not_found(&entry.bucket_id));
            }

            let key = (entry.bucket_id.clone(), entry.currency.clone());
            let row = balances.entry(key).or_insert_with(|| BucketBalance {
                bucket_id: entry.bucket_id.clone(),
                currency: entry.currency.clone(),
                balance: Decimal::ZERO,
                last_updated: now,
            });

            let delta = entry.delta_from(row.balance);
            let new_balance = row.balance + delta;
            if entry.require_funds && new_balance < Decimal::ZERO {
                return Err(Error::InsufficientFunds {
                    bucket_id: entry.bucket_id.clone(),
                    currency: entry.currency.clone(),
                    available: row.balance,
                    required: -delta,
                });
            }

            row.balance = new_balance;
            row.last_updated = now;
            touched.push(row.clone());
            pending.push((entry, delta));
        }

        // Every entry passed: commit balances and the audit rows together
        state.balances = balances;
        for (entry, delta) in pending {
            state.next_transaction_id += 1;
            let id = state.next_transaction_id;
            state.transactions.push(BucketTransaction {
                id,
                bucket_id: entry.bucket_id.clone(),
                transaction_type: entry.transaction_type,
                amount: delta,
                currency: entry.currency.clone(),
                description: entry.description.clone(),
                created_at: now,
            });
        }

        Ok(touched)
    }

    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<BucketTransaction>> {
        let state = self.state.read().await;

        let mut matching: Vec<_> = state
            .transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn purge_bucket(&self, bucket_id: &str) -> Result<u64> {
        if bucket_id == CORE_BUCKET_ID {
            return Err(Error::invalid_transition("Cannot delete core bucket"));
        }
        let mut state = self.state.write().await;
        if state.buckets.remove(bucket_id).is_none() {
            return Err(Error::bucket_not_found(bucket_id));
        }
        state.settings.remove(bucket_id);
        state.risk.remove(bucket_id);
        state.balances.retain(|(id, _), _| id != bucket_id);
        let before = state.transactions.len();
        state.transactions.retain(|tx| tx.bucket_id != bucket_id);
        Ok((before - state.transactions.len()) as u64)
    }
}

#[async_trait::async_trait]
impl BucketStore for MemorySatelliteStore {
    async fn get_bucket(&self, id: &str) -> Result<Option<Bucket>> {
        Ok(self.state.read().await.buckets.get(id).cloned())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        Ok(self.state.read().await.buckets.values().cloned().collect())
    }

    async fn insert_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut state = self.state.write().await;
        if state.buckets.contains_key(&bucket.id) {
            return Err(Error::AlreadyExists {
                kind: "bucket",
                id: bucket.id.clone(),
            });
        }
        state.buckets.insert(bucket.id.clone(), bucket.clone());
        Ok(())
    }

    async fn insert_satellite(&self, bucket: &Bucket, settings: &SatelliteSettings) -> Result<()> {
        if settings.satellite_id != bucket.id {
            return Err(Error::validation(format!(
                "settings for {} cannot be created with bucket {}",
                settings.satellite_id, bucket.id
            )));
        }
        let mut state = self.state.write().await;
        if state.buckets.contains_key(&bucket.id) {
            return Err(Error::AlreadyExists {
                kind: "bucket",
                id: bucket.id.clone(),
            });
        }
        state.buckets.insert(bucket.id.clone(), bucket.clone());
        state
            .settings
            .insert(settings.satellite_id.clone(), settings.clone());
        Ok(())
    }

    async fn update_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut state = self.state.write().await;
        match state.buckets.get_mut(&bucket.id) {
            Some(existing) => {
                *existing = bucket.clone();
                Ok(())
            }
            None => Err(Error::bucket_not_found(&bucket.id)),
        }
    }

    async fn delete_bucket(&self, id: &str) -> Result<()> {
        if id == CORE_BUCKET_ID {
            return Err(Error::invalid_transition("Cannot delete core bucket"));
        }
        let mut state = self.state.write().await;
        if state.buckets.remove(id).is_none() {
            return Err(Error::bucket_not_found(id));
        }
        state.settings.remove(id);
        state.risk.remove(id);
        Ok(())
    }

    async fn get_settings(&self, satellite_id: &str) -> Result<Option<SatelliteSettings>> {
        Ok(self.state.read().await.settings.get(satellite_id).cloned())
    }

    async fn save_settings(&self, settings: &SatelliteSettings) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.buckets.contains_key(&settings.satellite_id) {
            return Err(Error::bucket_not_found(&settings.satellite_id));
        }
        state
            .settings
            .insert(settings.satellite_id.clone(), settings.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemorySatelliteStore {
    async fn allocation_values(&self) -> Result<HashMap<String, f64>> {
        Ok(self.state.read().await.allocation.clone())
    }

    async fn set_allocation_value(&self, key: &str, value: f64) -> Result<()> {
        self.state
            .write()
            .await
            .allocation
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RiskStateStore for MemorySatelliteStore {
    async fn get_risk_state(&self, bucket_id: &str) -> Result<Option<RiskState>> {
        Ok(self.state.read().await.risk.get(bucket_id).cloned())
    }

    async fn save_risk_state(&self, risk_state: &RiskState) -> Result<()> {
        self.state
            .write()
            .await
            .risk
            .insert(risk_state.bucket_id.clone(), risk_state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BucketStatus;

    async fn store_with_buckets() -> MemorySatelliteStore {
        let store = MemorySatelliteStore::new();
        store.insert_bucket(&Bucket::core()).await.unwrap();
        store
            .insert_bucket(&Bucket::satellite(
                "sat",
                "Satellite",
                BucketStatus::Active,
                0.03,
                0.12,
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_apply_creates_rows_and_records_deltas() {
        let store = store_with_buckets().await;
        let rows = store
            .apply(&[
                LedgerEntry::adjust("core", "EUR", Decimal::new(100, 0), TransactionType::Deposit),
                LedgerEntry::set("sat", "EUR", Decimal::new(40, 0), TransactionType::Deposit),
            ])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(store.get_total_by_currency("EUR").await.unwrap(), Decimal::new(140, 0));

        let txs = store.transactions(&TransactionFilter::new()).await.unwrap();
        let total: Decimal = txs.iter().map(|t| t.amount).sum();
        assert_eq!(total, Decimal::new(140, 0));
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let store = store_with_buckets().await;
        store
            .adjust_cash_balance("sat", "EUR", Decimal::new(50, 0), TransactionType::Deposit, None)
            .await
            .unwrap();

        let result = store
            .apply(&[
                LedgerEntry::adjust("core", "EUR", Decimal::new(80, 0), TransactionType::TransferIn),
                LedgerEntry::adjust("sat", "EUR", Decimal::new(-80, 0), TransactionType::TransferOut)
                    .require_funds(),
            ])
            .await;

        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(store.get_cash_balance("core", "EUR").await.unwrap(), Decimal::ZERO);
        assert_eq!(store.get_cash_balance("sat", "EUR").await.unwrap(), Decimal::new(50, 0));
        assert_eq!(store.transactions(&TransactionFilter::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_rejects_unknown_bucket() {
        let store = store_with_buckets().await;
        let result = store
            .apply(&[LedgerEntry::adjust("ghost", "EUR", Decimal::ONE, TransactionType::Deposit)])
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_transactions_newest_first_with_paging() {
        let store = store_with_buckets().await;
        for i in 1..=5 {
            store
                .adjust_cash_balance("core", "EUR", Decimal::new(i, 0), TransactionType::Deposit, None)
                .await
                .unwrap();
        }

        let page = store
            .transactions(&TransactionFilter::new().bucket("core").limit(2).offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].amount, Decimal::new(4, 0));
        assert_eq!(page[1].amount, Decimal::new(3, 0));
    }

    #[tokio::test]
    async fn test_core_cannot_be_deleted() {
        let store = store_with_buckets().await;
        assert!(store.delete_bucket(CORE_BUCKET_ID).await.is_err());
        assert!(store.delete_bucket("sat").await.is_ok());
        assert!(store.get_bucket("sat").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_removes_bucket_and_ledger_together() {
        let store = store_with_buckets().await;
        store
            .save_settings(&SatelliteSettings::new("sat"))
            .await
            .unwrap();
        store
            .adjust_cash_balance("sat", "EUR", Decimal::TEN, TransactionType::Deposit, None)
            .await
            .unwrap();
        store
            .adjust_cash_balance(CORE_BUCKET_ID, "EUR", Decimal::ONE, TransactionType::Deposit, None)
            .await
            .unwrap();

        assert_eq!(store.purge_bucket("sat").await.unwrap(), 1);
        assert!(store.get_bucket("sat").await.unwrap().is_none());
        assert!(store.get_settings("sat").await.unwrap().is_none());
        assert!(store.list_balances(Some("sat")).await.unwrap().is_empty());
        assert_eq!(
            store.get_total_by_currency("EUR").await.unwrap(),
            Decimal::ONE
        );

        assert!(matches!(
            store.purge_bucket("sat").await,
            Err(Error::NotFound { .. })
        ));
        assert!(store.purge_bucket(CORE_BUCKET_ID).await.is_err());
        assert!(store.get_bucket(CORE_BUCKET_ID).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_satellite_is_all_or_nothing() {
        let store = store_with_buckets().await;
        let bucket = Bucket::satellite("new", "New", BucketStatus::Research, 0.03, 0.12);

        let err = store
            .insert_satellite(&bucket, &SatelliteSettings::new("other"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.get_bucket("new").await.unwrap().is_none());
        assert!(store.get_settings("other").await.unwrap().is_none());

        let existing = Bucket::satellite("sat", "Dup", BucketStatus::Research, 0.03, 0.12);
        let err = store
            .insert_satellite(&existing, &SatelliteSettings::new("sat"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert!(store.get_settings("sat").await.unwrap().is_none());
        assert_eq!(store.get_bucket("sat").await.unwrap().unwrap().name, "Satellite");

        store
            .insert_satellite(&bucket, &SatelliteSettings::new("new"))
            .await
            .unwrap();
        assert!(store.get_bucket("new").await.unwrap().is_some());
        assert!(store.get_settings("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cash_symbols() {
        let store = store_with_buckets().await;
        store
            .adjust_cash_balance("sat", "USD", Decimal::TEN, TransactionType::Deposit, None)
            .await
            .unwrap();
        assert_eq!(
            store.get_all_cash_symbols().await.unwrap(),
            vec!["CASH:USD:sat".to_string()]
        );
    }
}
