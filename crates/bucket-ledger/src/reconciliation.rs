//! Keeps the virtual bucket balances in line with the brokerage's actual cash.
//!
//! For every currency the sum of all bucket balances should equal the
//! balance the brokerage reports. Small drift is netted against the core
//! bucket; larger drift is reported and left for an operator.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use satellite_core::config::LedgerConfig;
use satellite_core::types::{
    BucketTransaction, LedgerEntry, TransactionFilter, TransactionType, CORE_BUCKET_ID,
};
use satellite_core::{BucketStore, CashManager, LedgerStore, Result, SatelliteStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default drift (in currency units) corrected without manual intervention.
pub const DEFAULT_AUTO_CORRECT_THRESHOLD: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

const DIAGNOSE_LOOKBACK_DAYS: i64 = 7;
const DIAGNOSE_MAX_TRANSACTIONS: u32 = 20;

/// Outcome of comparing virtual and actual balances for one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub currency: String,
    pub virtual_total: Decimal,
    pub actual_total: Decimal,
    /// virtual - actual.
    pub difference: Decimal,
    pub is_reconciled: bool,
    /// bucket_id -> adjustment applied.
    pub adjustments_made: BTreeMap<String, Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl ReconciliationResult {
    /// |difference| / actual. Infinite when only the actual side is zero.
    pub fn difference_pct(&self) -> f64 {
        if self.actual_total.is_zero() {
            if self.virtual_total.is_zero() {
                return 0.0;
            }
            return f64::INFINITY;
        }
        (self.difference.abs() / self.actual_total)
            .to_f64()
            .unwrap_or(f64::INFINITY)
    }
}

/// Read-only bundle for investigating a discrepancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyDiagnosis {
    pub currency: String,
    pub actual_balance: Decimal,
    pub virtual_total: Decimal,
    pub difference: Decimal,
    /// bucket_id -> non-zero balance.
    pub breakdown: BTreeMap<String, Decimal>,
    /// Newest first.
    pub recent_transactions: Vec<BucketTransaction>,
    pub timestamp: DateTime<Utc>,
}

pub struct ReconciliationService {
    store: Arc<dyn SatelliteStore>,
    auto_correct_threshold: Decimal,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn SatelliteStore>) -> Self {
        Self {
            store,
            auto_correct_threshold: DEFAULT_AUTO_CORRECT_THRESHOLD,
        }
    }

    pub fn from_config(store: Arc<dyn SatelliteStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            auto_correct_threshold: config.auto_correct_threshold,
        }
    }

    /// Compare without changing anything. Only an exact match is reconciled.
    pub async fn check_invariant(
        &self,
        currency: &str,
        actual_balance: Decimal,
    ) -> Result<ReconciliationResult> {
        let virtual_total = self.store.get_total_by_currency(currency).await?;
        let difference = virtual_total - actual_balance;

        Ok(ReconciliationResult {
            currency: currency.to_string(),
            virtual_total,
            actual_total: actual_balance,
            difference,
            is_reconciled: difference.is_zero(),
            adjustments_made: BTreeMap::new(),
            timestamp: Utc::now(),
        })
    }

    /// Net drift up to `threshold` (inclusive) against the core bucket.
    ///
    /// Larger drift is reported unreconciled and nothing is changed.
    pub async fn reconcile(
        &self,
        currency: &str,
        actual_balance: Decimal,
        threshold: Option<Decimal>,
    ) -> Result<ReconciliationResult> {
        let threshold = threshold.unwrap_or(self.auto_correct_threshold);
        let mut result = self.check_invariant(currency, actual_balance).await?;

        if result.is_reconciled {
            debug!(currency = %currency, "Reconciliation check passed");
            return Ok(result);
        }

        let difference = result.difference;
        if difference.abs() > threshold {
            warn!(
                currency = %currency,
                virtual_total = %result.virtual_total,
                actual_total = %result.actual_total,
                difference = %difference,
                "Large discrepancy detected. Manual intervention required."
            );
            return Ok(result);
        }

        let adjustment = -difference;
        let entry = LedgerEntry::adjust(
            CORE_BUCKET_ID,
            currency,
            adjustment,
            TransactionType::Reallocation,
        )
        .with_description(Some(format!(
            "Reconciliation adjustment ({} discrepancy)",
            signed_2dp(difference)
        )));
        self.store.apply(&[entry]).await?;

        info!(
            currency = %currency,
            discrepancy = %difference,
            "Auto-corrected discrepancy by adjusting core balance"
        );

        result
            .adjustments_made
            .insert(CORE_BUCKET_ID.to_string(), adjustment);
        result.is_reconciled = true;
        Ok(result)
    }

    /// Reconcile every currency in `actual_balances`, in currency order.
    pub async fn reconcile_all(
        &self,
        actual_balances: &BTreeMap<String, Decimal>,
        threshold: Option<Decimal>,
    ) -> Result<Vec<ReconciliationResult>> {
        let mut results = Vec::with_capacity(actual_balances.len());
        for (currency, actual) in actual_balances {
            results.push(self.reconcile(currency, *actual, threshold).await?);
        }
        Ok(results)
    }

    /// Set core to `actual - sum(non-core balances)` regardless of drift size.
    pub async fn force_reconcile_to_core(
        &self,
        currency: &str,
        actual_balance: Decimal,
    ) -> Result<ReconciliationResult> {
        let mut non_core_total = Decimal::ZERO;
        let mut current_core = Decimal::ZERO;
        for balance in self.store.list_balances(None).await? {
            if balance.currency != currency {
                continue;
            }
            if balance.bucket_id == CORE_BUCKET_ID {
                current_core = balance.balance;
            } else {
                non_core_total += balance.balance;
            }
        }

        let core_should_be = actual_balance - non_core_total;
        let adjustment = core_should_be - current_core;

        let mut adjustments_made = BTreeMap::new();
        if !adjustment.is_zero() {
            let entry = LedgerEntry::set(
                CORE_BUCKET_ID,
                currency,
                core_should_be,
                TransactionType::Reallocation,
            )
            .with_description(Some(format!(
                "Force reconciliation (adjusted from {:.2})",
                current_core
            )));
            self.store.apply(&[entry]).await?;

            warn!(
                currency = %currency,
                old_balance = %current_core,
                new_balance = %core_should_be,
                "Force reconciled core balance"
            );
            adjustments_made.insert(CORE_BUCKET_ID.to_string(), adjustment);
        }

        Ok(ReconciliationResult {
            currency: currency.to_string(),
            virtual_total: actual_balance,
            actual_total: actual_balance,
            difference: Decimal::ZERO,
            is_reconciled: true,
            adjustments_made,
            timestamp: Utc::now(),
        })
    }

    /// Seed core with the brokerage balance for currencies the ledger has never seen.
    ///
    /// A currency is seeded only when its virtual total is zero and the actual
    /// balance is positive, so repeated calls change nothing.
    pub async fn initialize_from_brokerage(
        &self,
        actual_balances: &BTreeMap<String, Decimal>,
    ) -> Result<Vec<ReconciliationResult>> {
        let mut results = Vec::with_capacity(actual_balances.len());

        for (currency, actual) in actual_balances {
            let virtual_total = self.store.get_total_by_currency(currency).await?;

            if virtual_total.is_zero() && *actual > Decimal::ZERO {
                let entry = LedgerEntry::set(
                    CORE_BUCKET_ID,
                    currency.as_str(),
                    *actual,
                    TransactionType::Deposit,
                )
                .with_description(Some("Initial balance from brokerage".into()));
                self.store.apply(&[entry]).await?;

                info!(currency = %currency, balance = %actual, "Initialized core balance");
            }

            results.push(self.check_invariant(currency, *actual).await?);
        }
        Ok(results)
    }

    /// bucket_id -> balance for every bucket holding a non-zero amount of `currency`.
    pub async fn get_balance_breakdown(&self, currency: &str) -> Result<BTreeMap<String, Decimal>> {
        let mut breakdown = BTreeMap::new();
        for bucket in self.store.list_buckets().await? {
            let balance = self.store.get_cash_balance(&bucket.id, currency).await?;
            if !balance.is_zero() {
                breakdown.insert(bucket.id, balance);
            }
        }
        Ok(breakdown)
    }

    pub async fn diagnose_discrepancy(
        &self,
        currency: &str,
        actual_balance: Decimal,
    ) -> Result<DiscrepancyDiagnosis> {
        let breakdown = self.get_balance_breakdown(currency).await?;
        let virtual_total: Decimal = breakdown.values().copied().sum();

        let filter = TransactionFilter::new()
            .currency(currency)
            .since(Utc::now() - Duration::days(DIAGNOSE_LOOKBACK_DAYS))
            .limit(DIAGNOSE_MAX_TRANSACTIONS);
        let recent_transactions = self.store.transactions(&filter).await?;

        Ok(DiscrepancyDiagnosis {
            currency: currency.to_string(),
            actual_balance,
            virtual_total,
            difference: virtual_total - actual_balance,
            breakdown,
            recent_transactions,
            timestamp: Utc::now(),
        })
    }
}

/// `+2.00` / `-2.00`.
fn signed_2dp(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    if rounded.is_sign_negative() {
        format!("{:.2}", rounded)
    } else {
        format!("+{:.2}", rounded)
    }
}
