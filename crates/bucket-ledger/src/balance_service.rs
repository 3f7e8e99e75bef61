//! Virtual cash ledger: settlements, dividends, transfers and deposit splits.
//!
//! Every mutation is expressed as a batch of [`LedgerEntry`] values handed to
//! [`LedgerStore::apply`], so balance rows and their transaction rows always
//! change together.

use chrono::{Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use satellite_core::cash::parse_cash_symbol;
use satellite_core::types::{
    keys, AllocationSettings, Bucket, BucketBalance, BucketStatus, BucketTransaction,
    LedgerEntry, PortfolioSummary, TransactionFilter, TransactionType, AMOUNT_SCALE,
    CORE_BUCKET_ID, MAX_SATELLITE_BUDGET_PCT,
};
use satellite_core::{
    BucketStore, CashManager, Error, LedgerStore, Result, SatelliteStore, SettingsStore,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// Core/satellite differences below this are left alone by [`BalanceService::reallocate`].
const REALLOCATION_MIN_ADJUSTMENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Ledger operations over a [`SatelliteStore`].
pub struct BalanceService {
    store: Arc<dyn SatelliteStore>,
}

impl BalanceService {
    pub fn new(store: Arc<dyn SatelliteStore>) -> Self {
        Self { store }
    }

    // --- Queries ---

    pub async fn get_balance(&self, bucket_id: &str, currency: &str) -> Result<Option<BucketBalance>> {
        self.store.get_balance(bucket_id, currency).await
    }

    /// Balance amount, zero when the bucket never held the currency.
    pub async fn get_balance_amount(&self, bucket_id: &str, currency: &str) -> Result<Decimal> {
        self.store.get_cash_balance(bucket_id, currency).await
    }

    pub async fn get_all_balances(&self, bucket_id: &str) -> Result<Vec<BucketBalance>> {
        self.store.list_balances(Some(bucket_id)).await
    }

    pub async fn get_total_by_currency(&self, currency: &str) -> Result<Decimal> {
        self.store.get_total_by_currency(currency).await
    }

    /// Distinct currencies held by any bucket, sorted.
    pub async fn get_all_currencies(&self) -> Result<Vec<String>> {
        let currencies: BTreeSet<String> = self
            .store
            .get_all_cash_symbols()
            .await?
            .iter()
            .filter_map(|symbol| parse_cash_symbol(symbol))
            .map(|(currency, _)| currency)
            .collect();
        Ok(currencies.into_iter().collect())
    }

    /// bucket_id -> currency -> balance, including buckets with no cash.
    pub async fn get_portfolio_summary(&self) -> Result<PortfolioSummary> {
        let mut summary: PortfolioSummary = self
            .store
            .list_buckets()
            .await?
            .into_iter()
            .map(|b| (b.id, BTreeMap::new()))
            .collect();

        for balance in self.store.list_balances(None).await? {
            summary
                .entry(balance.bucket_id)
                .or_default()
                .insert(balance.currency, balance.balance);
        }
        Ok(summary)
    }

    pub async fn get_transactions(
        &self,
        bucket_id: &str,
        limit: u32,
        offset: u32,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<BucketTransaction>> {
        let mut filter = TransactionFilter::new()
            .bucket(bucket_id)
            .limit(limit)
            .offset(offset);
        filter.transaction_type = transaction_type;
        self.store.transactions(&filter).await
    }

    /// Transactions of the last `days` days, newest first.
    pub async fn get_recent_transactions(
        &self,
        bucket_id: &str,
        days: i64,
    ) -> Result<Vec<BucketTransaction>> {
        let filter = TransactionFilter::new()
            .bucket(bucket_id)
            .since(Utc::now() - Duration::days(days));
        self.store.transactions(&filter).await
    }

    pub async fn get_allocation_settings(&self) -> Result<AllocationSettings> {
        self.store.allocation_settings().await
    }

    pub async fn update_satellite_budget(&self, budget_pct: f64) -> Result<()> {
        if !(0.0..=MAX_SATELLITE_BUDGET_PCT).contains(&budget_pct) {
            return Err(Error::validation(format!(
                "satellite budget must be between 0% and {:.0}%, got {:.1}%",
                MAX_SATELLITE_BUDGET_PCT * 100.0,
                budget_pct * 100.0
            )));
        }
        self.store
            .set_allocation_value(keys::SATELLITE_BUDGET_PCT, budget_pct)
            .await?;
        info!(budget_pct, "Updated satellite budget");
        Ok(())
    }

    // --- Mutations ---

    /// Settle a trade against a bucket's cash. Buys debit, sells credit.
    ///
    /// A buy larger than the available cash fails with `InsufficientFunds`.
    pub async fn record_trade_settlement(
        &self,
        bucket_id: &str,
        amount: Decimal,
        currency: &str,
        is_buy: bool,
        description: Option<String>,
    ) -> Result<BucketBalance> {
        if amount < Decimal::ZERO {
            return Err(Error::validation("amount must be positive"));
        }
        let amount = amount.round_dp(AMOUNT_SCALE);

        let entry = if is_buy {
            LedgerEntry::adjust(bucket_id, currency, -amount, TransactionType::TradeBuy)
                .with_description(description.or_else(|| Some("Buy settlement".into())))
                .require_funds()
        } else {
            LedgerEntry::adjust(bucket_id, currency, amount, TransactionType::TradeSell)
                .with_description(description.or_else(|| Some("Sell settlement".into())))
        };

        let balance = self.apply_one(entry).await?;
        info!(
            bucket_id = %bucket_id,
            amount = %amount,
            currency = %currency,
            action = if is_buy { "bought" } else { "sold" },
            new_balance = %balance.balance,
            "Recorded trade settlement"
        );
        Ok(balance)
    }

    pub async fn record_dividend(
        &self,
        bucket_id: &str,
        amount: Decimal,
        currency: &str,
        description: Option<String>,
    ) -> Result<BucketBalance> {
        let amount = positive_amount(amount)?;
        let entry = LedgerEntry::adjust(bucket_id, currency, amount, TransactionType::Dividend)
            .with_description(description.or_else(|| Some("Dividend payment".into())));

        let balance = self.apply_one(entry).await?;
        info!(
            bucket_id = %bucket_id,
            amount = %amount,
            currency = %currency,
            new_balance = %balance.balance,
            "Recorded dividend"
        );
        Ok(balance)
    }

    /// Move cash between two buckets as a matched transfer_out/transfer_in pair.
    ///
    /// Returns the source and destination balances after the move.
    pub async fn transfer_between_buckets(
        &self,
        from_bucket_id: &str,
        to_bucket_id: &str,
        amount: Decimal,
        currency: &str,
        description: Option<String>,
    ) -> Result<(BucketBalance, BucketBalance)> {
        let amount = positive_amount(amount)?;
        if from_bucket_id == to_bucket_id {
            return Err(Error::validation("cannot transfer to same bucket"));
        }

        let from = self.bucket(from_bucket_id).await?;
        let to = self.bucket(to_bucket_id).await?;

        let available = self.store.get_cash_balance(from_bucket_id, currency).await?;
        if available < amount {
            return Err(Error::InsufficientFunds {
                bucket_id: from_bucket_id.to_string(),
                currency: currency.to_string(),
                available,
                required: amount,
            });
        }

        let out_description = description
            .clone()
            .unwrap_or_else(|| format!("Transfer to {}", to.name));
        let in_description = description.unwrap_or_else(|| format!("Transfer from {}", from.name));

        let entries = [
            LedgerEntry::adjust(from_bucket_id, currency, -amount, TransactionType::TransferOut)
                .with_description(Some(out_description))
                .require_funds(),
            LedgerEntry::adjust(to_bucket_id, currency, amount, TransactionType::TransferIn)
                .with_description(Some(in_description)),
        ];

        let mut balances = self.store.apply(&entries).await?.into_iter();
        let (Some(from_balance), Some(to_balance)) = (balances.next(), balances.next()) else {
            return Err(Error::External(
                "ledger store returned fewer balances than entries".into(),
            ));
        };

        info!(
            from = %from_bucket_id,
            to = %to_bucket_id,
            amount = %amount,
            currency = %currency,
            "Transferred between buckets"
        );
        Ok((from_balance, to_balance))
    }

    /// Split an inbound deposit between core and the funded satellites.
    ///
    /// The satellite share (`amount * satellite_budget_pct`) is divided evenly
    /// across active and accumulating satellites; without any, it goes to core.
    /// Returns bucket_id -> amount credited.
    pub async fn allocate_deposit(
        &self,
        amount: Decimal,
        currency: &str,
        description: Option<String>,
    ) -> Result<BTreeMap<String, Decimal>> {
        let amount = positive_amount(amount)?;
        let settings = self.store.allocation_settings().await?;
        let budget_pct = settings.satellite_budget_pct;

        let satellite_amount = if budget_pct > 0.0 {
            (amount * to_decimal(budget_pct)?).round_dp(AMOUNT_SCALE)
        } else {
            Decimal::ZERO
        };
        let core_amount = amount - satellite_amount;

        let satellites = if satellite_amount > Decimal::ZERO {
            self.satellites_where(|status| status.receives_deposits())
                .await?
        } else {
            Vec::new()
        };

        let mut entries = Vec::new();
        let mut allocation = BTreeMap::new();

        if core_amount > Decimal::ZERO {
            let core_description = description.unwrap_or_else(|| {
                format!("Deposit allocation ({:.1}% to core)", (1.0 - budget_pct) * 100.0)
            });
            entries.push(
                LedgerEntry::adjust(CORE_BUCKET_ID, currency, core_amount, TransactionType::Deposit)
                    .with_description(Some(core_description)),
            );
            allocation.insert(CORE_BUCKET_ID.to_string(), core_amount);
        }

        if satellite_amount > Decimal::ZERO {
            if satellites.is_empty() {
                entries.push(
                    LedgerEntry::adjust(
                        CORE_BUCKET_ID,
                        currency,
                        satellite_amount,
                        TransactionType::Deposit,
                    )
                    .with_description(Some(
                        "Deposit - no active satellites, allocated to core".into(),
                    )),
                );
                *allocation
                    .entry(CORE_BUCKET_ID.to_string())
                    .or_insert(Decimal::ZERO) += satellite_amount;
            } else {
                let shares = split_evenly(satellite_amount, satellites.len());
                for (satellite, share) in satellites.iter().zip(shares) {
                    entries.push(
                        LedgerEntry::adjust(&satellite.id, currency, share, TransactionType::Deposit)
                            .with_description(Some(format!(
                                "Deposit allocation to {}",
                                satellite.name
                            ))),
                    );
                    allocation.insert(satellite.id.clone(), share);
                }
            }
        }

        self.store.apply(&entries).await?;

        info!(
            total_amount = %amount,
            currency = %currency,
            core_amount = %allocation.get(CORE_BUCKET_ID).copied().unwrap_or_default(),
            satellites_funded = satellites.len(),
            "Allocated deposit"
        );
        Ok(allocation)
    }

    /// Rebalance cash so core holds `total * (1 - satellite_budget_pct)`.
    ///
    /// The opposite adjustment is spread evenly over active satellites.
    /// Returns the new balances of every bucket touched, or just core's
    /// balance when no move was needed.
    pub async fn reallocate(&self, currency: &str) -> Result<BTreeMap<String, Decimal>> {
        let total = self.store.get_total_by_currency(currency).await?;
        if total.is_zero() {
            return Ok(BTreeMap::new());
        }

        let settings = self.store.allocation_settings().await?;
        let target_core =
            (total * (Decimal::ONE - to_decimal(settings.satellite_budget_pct)?)).round_dp(AMOUNT_SCALE);
        let core_balance = self.store.get_cash_balance(CORE_BUCKET_ID, currency).await?;

        let core_adjustment = target_core - core_balance;
        let satellite_adjustment = -core_adjustment;

        let satellites = self
            .satellites_where(|status| status == BucketStatus::Active)
            .await?;

        if satellite_adjustment.abs() < REALLOCATION_MIN_ADJUSTMENT || satellites.is_empty() {
            info!(
                currency = %currency,
                total_balance = %total,
                "No reallocation needed"
            );
            return Ok(BTreeMap::from([(CORE_BUCKET_ID.to_string(), core_balance)]));
        }

        let mut entries = vec![LedgerEntry::adjust(
            CORE_BUCKET_ID,
            currency,
            core_adjustment,
            TransactionType::Reallocation,
        )
        .with_description(Some("Reallocation adjustment".into()))];

        let shares = split_evenly(satellite_adjustment, satellites.len());
        for (satellite, share) in satellites.iter().zip(shares) {
            entries.push(
                LedgerEntry::adjust(&satellite.id, currency, share, TransactionType::Reallocation)
                    .with_description(Some("Reallocation adjustment".into())),
            );
        }

        let balances = self.store.apply(&entries).await?;

        info!(
            currency = %currency,
            core_adjustment = %core_adjustment,
            satellites_adjusted = satellites.len(),
            "Completed reallocation"
        );
        Ok(balances
            .into_iter()
            .map(|b| (b.bucket_id, b.balance))
            .collect())
    }

    async fn apply_one(&self, entry: LedgerEntry) -> Result<BucketBalance> {
        let bucket_id = entry.bucket_id.clone();
        self.store
            .apply(std::slice::from_ref(&entry))
            .await?
            .pop()
            .ok_or_else(|| Error::bucket_not_found(bucket_id))
    }

    async fn bucket(&self, bucket_id: &str) -> Result<Bucket> {
        self.store
            .get_bucket(bucket_id)
            .await?
            .ok_or_else(|| Error::bucket_not_found(bucket_id))
    }

    async fn satellites_where<F>(&self, keep: F) -> Result<Vec<Bucket>>
    where
        F: Fn(BucketStatus) -> bool,
    {
        Ok(self
            .store
            .list_buckets()
            .await?
            .into_iter()
            .filter(|b| b.is_satellite() && keep(b.status))
            .collect())
    }
}

fn positive_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount must be positive"));
    }
    Ok(amount.round_dp(AMOUNT_SCALE))
}

fn to_decimal(pct: f64) -> Result<Decimal> {
    Decimal::from_f64(pct)
        .ok_or_else(|| Error::validation(format!("invalid allocation fraction {pct}")))
}

/// Split `total` into `parts` shares at ledger precision.
///
/// The last share absorbs the rounding remainder so the shares sum to `total`.
pub(crate) fn split_evenly(total: Decimal, parts: usize) -> Vec<Decimal> {
    if parts == 0 {
        return Vec::new();
    }
    let share = (total / Decimal::from(parts)).round_dp(AMOUNT_SCALE);
    let mut shares = vec![share; parts];
    let allotted = share * Decimal::from(parts - 1);
    shares[parts - 1] = total - allotted;
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use satellite_core::MemorySatelliteStore;
    use std::collections::HashMap;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    async fn setup(budget_pct: f64) -> (BalanceService, Arc<MemorySatelliteStore>) {
        let store = Arc::new(MemorySatelliteStore::with_allocation(HashMap::from([(
            keys::SATELLITE_BUDGET_PCT.to_string(),
            budget_pct,
        )])));
        store.insert_bucket(&Bucket::core()).await.unwrap();
        for (id, name, status) in [
            ("momentum", "Momentum", BucketStatus::Active),
            ("value", "Value", BucketStatus::Accumulating),
            ("idea", "Idea", BucketStatus::Research),
        ] {
            store
                .insert_bucket(&Bucket::satellite(id, name, status, 0.03, 0.12))
                .await
                .unwrap();
        }
        (BalanceService::new(store.clone()), store)
    }

    async fn assert_ledger_consistent(store: &MemorySatelliteStore, currency: &str) {
        let total = store.get_total_by_currency(currency).await.unwrap();
        let recorded: Decimal = store
            .transactions(&TransactionFilter::new().currency(currency))
            .await
            .unwrap()
            .iter()
            .map(|tx| tx.amount)
            .sum();
        assert_eq!(total, recorded);
    }

    #[tokio::test]
    async fn test_trade_settlement_debits_and_credits() {
        let (service, store) = setup(0.0).await;
        service
            .record_dividend("momentum", dec(500), "EUR", None)
            .await
            .unwrap();

        let after_buy = service
            .record_trade_settlement("momentum", dec(300), "EUR", true, None)
            .await
            .unwrap();
        assert_eq!(after_buy.balance, dec(200));

        let after_sell = service
            .record_trade_settlement("momentum", dec(50), "EUR", false, Some("Sold AAPL".into()))
            .await
            .unwrap();
        assert_eq!(after_sell.balance, dec(250));

        let txs = service
            .get_transactions("momentum", 10, 0, None)
            .await
            .unwrap();
        assert_eq!(txs[0].description.as_deref(), Some("Sold AAPL"));
        assert_eq!(txs[1].description.as_deref(), Some("Buy settlement"));
        assert_eq!(txs[1].amount, dec(-300));
        assert_ledger_consistent(&store, "EUR").await;
    }

    #[tokio::test]
    async fn test_settlement_validation() {
        let (service, _) = setup(0.0).await;
        assert!(matches!(
            service
                .record_trade_settlement("momentum", dec(-1), "EUR", false, None)
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service
                .record_trade_settlement("momentum", dec(10), "EUR", true, None)
                .await,
            Err(Error::InsufficientFunds { .. })
        ));
        // Zero settlement is accepted
        assert!(service
            .record_trade_settlement("momentum", Decimal::ZERO, "EUR", false, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_dividend_rejects_non_positive() {
        let (service, _) = setup(0.0).await;
        assert!(service
            .record_dividend("momentum", Decimal::ZERO, "EUR", None)
            .await
            .is_err());
        let balance = service
            .record_dividend("momentum", dec(12), "USD", None)
            .await
            .unwrap();
        assert_eq!(balance.balance, dec(12));
    }

    #[tokio::test]
    async fn test_transfer_records_matched_pair() {
        let (service, store) = setup(0.0).await;
        service
            .record_dividend(CORE_BUCKET_ID, dec(1000), "EUR", None)
            .await
            .unwrap();

        let (from, to) = service
            .transfer_between_buckets(CORE_BUCKET_ID, "momentum", dec(400), "EUR", None)
            .await
            .unwrap();
        assert_eq!(from.balance, dec(600));
        assert_eq!(to.balance, dec(400));

        let out = service
            .get_transactions(CORE_BUCKET_ID, 1, 0, Some(TransactionType::TransferOut))
            .await
            .unwrap();
        assert_eq!(out[0].description.as_deref(), Some("Transfer to Momentum"));
        let incoming = service
            .get_transactions("momentum", 1, 0, None)
            .await
            .unwrap();
        assert_eq!(incoming[0].description.as_deref(), Some("Transfer from Core"));
        assert_ledger_consistent(&store, "EUR").await;
    }

    #[tokio::test]
    async fn test_transfer_rejections_leave_ledger_untouched() {
        let (service, store) = setup(0.0).await;
        service
            .record_dividend(CORE_BUCKET_ID, dec(100), "EUR", None)
            .await
            .unwrap();

        let err = service
            .transfer_between_buckets(CORE_BUCKET_ID, "momentum", dec(150), "EUR", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));

        let err = service
            .transfer_between_buckets(CORE_BUCKET_ID, CORE_BUCKET_ID, dec(10), "EUR", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot transfer to same bucket"));

        let err = service
            .transfer_between_buckets(CORE_BUCKET_ID, "ghost", dec(10), "EUR", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        assert_eq!(service.get_balance_amount(CORE_BUCKET_ID, "EUR").await.unwrap(), dec(100));
        assert_eq!(
            store.transactions(&TransactionFilter::new()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_allocate_deposit_splits_across_funded_satellites() {
        let (service, store) = setup(0.10).await;
        let allocation = service.allocate_deposit(dec(1000), "EUR", None).await.unwrap();

        assert_eq!(allocation[CORE_BUCKET_ID], dec(900));
        assert_eq!(allocation["momentum"], dec(50));
        assert_eq!(allocation["value"], dec(50));
        // research satellites do not receive deposits
        assert!(!allocation.contains_key("idea"));

        let core_tx = service
            .get_transactions(CORE_BUCKET_ID, 1, 0, None)
            .await
            .unwrap();
        assert_eq!(
            core_tx[0].description.as_deref(),
            Some("Deposit allocation (90.0% to core)")
        );
        assert_ledger_consistent(&store, "EUR").await;
    }

    #[tokio::test]
    async fn test_allocate_deposit_uneven_split_sums_exactly() {
        let (service, store) = setup(0.10).await;
        store
            .insert_bucket(&Bucket::satellite("third", "Third", BucketStatus::Active, 0.03, 0.12))
            .await
            .unwrap();

        let allocation = service.allocate_deposit(dec(100), "EUR", None).await.unwrap();
        let total: Decimal = allocation.values().copied().sum();
        assert_eq!(total, dec(100));
        assert_eq!(allocation["momentum"], Decimal::new(333333333, 8));
        assert_ledger_consistent(&store, "EUR").await;
    }

    #[tokio::test]
    async fn test_allocate_deposit_without_satellites_goes_to_core() {
        let (service, store) = setup(0.20).await;
        for id in ["momentum", "value"] {
            let mut bucket = store.get_bucket(id).await.unwrap().unwrap();
            bucket.status = BucketStatus::Paused;
            store.update_bucket(&bucket).await.unwrap();
        }

        let allocation = service.allocate_deposit(dec(500), "EUR", None).await.unwrap();
        assert_eq!(allocation.len(), 1);
        assert_eq!(allocation[CORE_BUCKET_ID], dec(500));

        let txs = service
            .get_transactions(CORE_BUCKET_ID, 10, 0, None)
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(
            txs[0].description.as_deref(),
            Some("Deposit - no active satellites, allocated to core")
        );
        assert!(service.allocate_deposit(Decimal::ZERO, "EUR", None).await.is_err());
    }

    #[tokio::test]
    async fn test_reallocate_moves_cash_to_active_satellites() {
        let (service, store) = setup(0.10).await;
        service
            .record_dividend(CORE_BUCKET_ID, dec(1000), "EUR", None)
            .await
            .unwrap();

        let balances = service.reallocate("EUR").await.unwrap();
        assert_eq!(balances[CORE_BUCKET_ID], dec(900));
        assert_eq!(balances["momentum"], dec(100));
        // only active satellites take part
        assert!(!balances.contains_key("value"));

        let again = service.reallocate("EUR").await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[CORE_BUCKET_ID], dec(900));
        assert_ledger_consistent(&store, "EUR").await;

        assert!(service.reallocate("JPY").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_currencies_and_summary() {
        let (service, _) = setup(0.0).await;
        service
            .record_dividend(CORE_BUCKET_ID, dec(10), "EUR", None)
            .await
            .unwrap();
        service
            .record_dividend("momentum", dec(5), "USD", None)
            .await
            .unwrap();
        service
            .record_dividend("value", dec(7), "EUR", None)
            .await
            .unwrap();

        assert_eq!(service.get_all_currencies().await.unwrap(), vec!["EUR", "USD"]);

        let summary = service.get_portfolio_summary().await.unwrap();
        assert_eq!(summary[CORE_BUCKET_ID]["EUR"], dec(10));
        assert_eq!(summary["momentum"]["USD"], dec(5));
        assert!(summary["idea"].is_empty());
    }

    #[tokio::test]
    async fn test_currencies_round_trip_to_totals() {
        let (service, _) = setup(0.0).await;
        service
            .record_dividend("momentum", dec(3), "eur", None)
            .await
            .unwrap();

        let currencies = service.get_all_currencies().await.unwrap();
        assert_eq!(currencies, vec!["eur"]);
        for currency in &currencies {
            assert_eq!(service.get_total_by_currency(currency).await.unwrap(), dec(3));
        }
    }

    #[tokio::test]
    async fn test_update_satellite_budget_bounds() {
        let (service, _) = setup(0.0).await;
        assert!(service.update_satellite_budget(0.31).await.is_err());
        assert!(service.update_satellite_budget(-0.01).await.is_err());
        service.update_satellite_budget(0.25).await.unwrap();
        let settings = service.get_allocation_settings().await.unwrap();
        assert_eq!(settings.satellite_budget_pct, 0.25);
    }

    #[test]
    fn test_split_evenly_keeps_total() {
        let shares = split_evenly(Decimal::new(1, 0), 3);
        assert_eq!(shares.iter().copied().sum::<Decimal>(), Decimal::ONE);
        assert_eq!(shares[0], Decimal::new(33333333, 8));
        assert!(split_evenly(Decimal::ONE, 0).is_empty());
    }
}
