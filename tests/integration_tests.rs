//! Integration tests for component interactions.
//!
//! These tests drive the bucket, ledger, reconciliation, risk and
//! performance services together over the in-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bucket_ledger::{BalanceService, BucketService, ReconciliationService};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use satellite_core::types::{keys, BucketStatus, TransactionFilter, CORE_BUCKET_ID};
use satellite_core::{Error, LedgerStore, MemorySatelliteStore, SatelliteStore};

fn dec(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

/// Store with a 20% satellite budget, core, and two accumulating satellites.
async fn portfolio() -> (Arc<MemorySatelliteStore>, BucketService, BalanceService) {
    let store = Arc::new(MemorySatelliteStore::with_allocation(HashMap::from([(
        keys::SATELLITE_BUDGET_PCT.to_string(),
        0.20,
    )])));
    let dyn_store: Arc<dyn SatelliteStore> = store.clone();

    let buckets = BucketService::new(dyn_store.clone());
    buckets.ensure_core().await.unwrap();
    buckets
        .create_satellite("momentum", "Momentum", None, false)
        .await
        .unwrap();
    buckets
        .create_satellite("dividend", "Dividend", None, false)
        .await
        .unwrap();

    (store, buckets, BalanceService::new(dyn_store))
}

/// Every balance change is mirrored by a transaction, so the log sums to the balances.
#[tokio::test]
async fn test_transaction_log_matches_balances() -> anyhow::Result<()> {
    let (store, buckets, balances) = portfolio().await;

    let allocation = balances.allocate_deposit(dec(1000), "EUR", None).await?;
    assert_eq!(allocation[CORE_BUCKET_ID], dec(800));
    assert_eq!(allocation["momentum"], dec(100));
    assert_eq!(allocation["dividend"], dec(100));

    balances
        .record_trade_settlement("momentum", dec(60), "EUR", true, None)
        .await?;
    balances
        .record_trade_settlement("momentum", dec(75), "EUR", false, None)
        .await?;
    balances
        .transfer_between_buckets(CORE_BUCKET_ID, "dividend", dec(50), "EUR", None)
        .await?;
    balances
        .record_dividend("dividend", Decimal::new(1250, 2), "EUR", None)
        .await?;

    buckets.activate("momentum").await?;
    balances.reallocate("EUR").await?;

    let logged: Decimal = store
        .transactions(&TransactionFilter::new())
        .await?
        .iter()
        .filter(|tx| tx.currency == "EUR")
        .map(|tx| tx.amount)
        .sum();
    let total = balances.get_total_by_currency("EUR").await?;
    assert_eq!(logged, total);
    assert_eq!(total, Decimal::new(102750, 2));
    Ok(())
}

#[tokio::test]
async fn test_small_drift_is_corrected_against_core() {
    let (store, _, balances) = portfolio().await;
    let reconciliation = ReconciliationService::new(store.clone());

    balances
        .allocate_deposit(Decimal::new(1002, 0), "USD", None)
        .await
        .unwrap();
    let core_before = balances
        .get_balance_amount(CORE_BUCKET_ID, "USD")
        .await
        .unwrap();

    let result = reconciliation
        .reconcile("USD", dec(1000), None)
        .await
        .unwrap();
    assert!(result.is_reconciled);
    assert_eq!(result.adjustments_made[CORE_BUCKET_ID], dec(-2));
    assert_eq!(
        balances.get_balance_amount(CORE_BUCKET_ID, "USD").await.unwrap(),
        core_before - dec(2)
    );
    assert!(reconciliation
        .check_invariant("USD", dec(1000))
        .await
        .unwrap()
        .is_reconciled);

    // Beyond the threshold nothing is touched
    let large = reconciliation
        .reconcile("USD", dec(900), None)
        .await
        .unwrap();
    assert!(!large.is_reconciled);
    assert!(large.adjustments_made.is_empty());
    assert_eq!(
        balances.get_total_by_currency("USD").await.unwrap(),
        dec(1000)
    );
}

#[tokio::test]
async fn test_brokerage_initialization_is_idempotent() -> anyhow::Result<()> {
    let (store, _, balances) = portfolio().await;
    let reconciliation = ReconciliationService::new(store);

    let actual = BTreeMap::from([("EUR".to_string(), dec(5000)), ("USD".to_string(), dec(0))]);
    let first = reconciliation.initialize_from_brokerage(&actual).await?;
    assert!(first.iter().all(|r| r.is_reconciled));
    assert_eq!(
        balances.get_balance_amount(CORE_BUCKET_ID, "EUR").await?,
        dec(5000)
    );

    reconciliation.initialize_from_brokerage(&actual).await?;
    assert_eq!(balances.get_total_by_currency("EUR").await?, dec(5000));
    let seeded = balances
        .get_transactions(CORE_BUCKET_ID, 100, 0, None)
        .await?;
    assert_eq!(seeded.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_retire_requires_empty_cash() {
    let (_, buckets, balances) = portfolio().await;
    balances
        .allocate_deposit(dec(1000), "EUR", None)
        .await
        .unwrap();

    buckets.activate("momentum").await.unwrap();
    buckets.pause("momentum").await.unwrap();

    let err = buckets.retire("momentum").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
    assert!(err.to_string().contains("still has 100.00 EUR in cash"));
    assert_eq!(
        buckets.get_bucket("momentum").await.unwrap().status,
        BucketStatus::Paused
    );

    balances
        .transfer_between_buckets("momentum", CORE_BUCKET_ID, dec(100), "EUR", None)
        .await
        .unwrap();
    let retired = buckets.retire("momentum").await.unwrap();
    assert_eq!(retired.status, BucketStatus::Retired);

    let removed = buckets.purge_retired("momentum").await.unwrap();
    assert_eq!(removed, 2);
    assert!(matches!(
        buckets.get_bucket("momentum").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_insufficient_funds_leave_ledger_untouched() {
    let (_, _, balances) = portfolio().await;
    balances
        .allocate_deposit(dec(1000), "EUR", None)
        .await
        .unwrap();

    let err = balances
        .transfer_between_buckets("momentum", "dividend", dec(150), "EUR", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));
    assert_eq!(
        balances.get_balance_amount("momentum", "EUR").await.unwrap(),
        dec(100)
    );
    assert_eq!(
        balances.get_balance_amount("dividend", "EUR").await.unwrap(),
        dec(100)
    );
}

#[tokio::test]
async fn test_aggression_combines_base_and_reawakening() {
    use risk_manager::{LimitingFactor, RiskControlConfig, RiskController};

    let (store, _, _) = portfolio().await;
    let controller = RiskController::new(store, RiskControlConfig::default());

    let assessment = controller
        .assess("momentum", dec(8500), dec(10000), &[])
        .await
        .unwrap();
    assert_eq!(assessment.base.aggression, 0.8);
    assert_eq!(assessment.base.limiting_factor, LimitingFactor::Allocation);
    assert_eq!(assessment.aggression, 0.8);

    controller.start_reawakening("momentum").await.unwrap();
    let throttled = controller
        .assess("momentum", dec(8500), dec(10000), &[])
        .await
        .unwrap();
    assert!(throttled.reawakening.in_reawakening);
    assert!((throttled.aggression - 0.8 * throttled.reawakening.multiplier).abs() < 1e-12);
    assert!(throttled.aggression < assessment.aggression);
}

#[test]
fn test_fifo_matching_ignores_input_order() {
    use performance::match_trades;
    use satellite_core::types::{Trade, TradeSide};

    let now = Utc::now();
    let trades = vec![
        Trade::new("AAPL", TradeSide::Buy, 50.0, 150.0, now),
        Trade::new("AAPL", TradeSide::Buy, 30.0, 155.0, now + Duration::hours(1)),
        Trade::new("AAPL", TradeSide::Sell, 60.0, 160.0, now + Duration::hours(2)),
    ];
    let closed = match_trades(&trades);
    let pnl: f64 = closed.iter().map(|c| c.profit_loss).sum();
    assert_eq!(pnl, 550.0);

    let mut shuffled = trades.clone();
    shuffled.swap(0, 2);
    assert_eq!(match_trades(&shuffled), closed);
}

#[test]
fn test_meta_allocation_stays_within_budget() {
    use performance::{calculate_allocations, SatelliteScore};

    let satellites: Vec<SatelliteScore> = [(0.04, 1.8), (0.06, -0.4), (0.05, 0.0), (0.05, 0.9)]
        .iter()
        .enumerate()
        .map(|(i, &(current_pct, score))| SatelliteScore {
            bucket_id: format!("sat{i}"),
            current_pct,
            score,
        })
        .collect();

    let recommendations = calculate_allocations(&satellites, 0.20, 0.03, 0.12, 0.5);
    let total: f64 = recommendations.iter().map(|r| r.new_allocation_pct).sum();
    assert!((total - 0.20).abs() < 1e-9);
    assert!(recommendations
        .iter()
        .all(|r| r.target_allocation_pct >= 0.03 && r.target_allocation_pct <= 0.12));

    let best = &recommendations[0];
    let worst = &recommendations[1];
    assert!(best.new_allocation_pct > worst.new_allocation_pct);
}

/// Services built from the loaded configuration honor its tunables.
#[tokio::test]
async fn test_services_from_config() -> anyhow::Result<()> {
    use risk_manager::RiskControlConfig;
    use satellite_core::config::Config;

    satellite_core::telemetry::init_tracing("warn", false)?;

    let mut config = Config::test_config();
    config.ledger.auto_correct_threshold = dec(1);
    config.risk.reawakening_stages = 3;
    config.validate()?;

    let (store, _, balances) = portfolio().await;
    balances.allocate_deposit(dec(1002), "USD", None).await?;

    // Drift of 2 is above the configured threshold of 1
    let reconciliation = ReconciliationService::from_config(store.clone(), &config.ledger);
    let result = reconciliation.reconcile("USD", dec(1000), None).await?;
    assert!(!result.is_reconciled);
    assert!(result.adjustments_made.is_empty());

    let risk = RiskControlConfig::from(&config.risk);
    assert_eq!(risk.reawakening.stages, 3);
    assert_eq!(risk.win_cooldown.cooldown_days, config.risk.cooldown_days);
    Ok(())
}
