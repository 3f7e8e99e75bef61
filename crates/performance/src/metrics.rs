//! Per-bucket performance evaluation from realized trades.

use chrono::{DateTime, Duration, Utc};
use satellite_core::types::{SatelliteSettings, Trade};
use satellite_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::lots::{equity_curve, initial_capital, match_trades, ClosedTrade};
use crate::ratios::{
    annualize, calmar_ratio, composite_score, max_drawdown, profit_factor, sharpe_ratio,
    sortino_ratio, std_dev, win_rate, ScoreInputs,
};

/// Raw trades required before a bucket is evaluated.
pub const MIN_TRADES: usize = 5;

/// Closed (matched) trades required before a bucket is evaluated.
pub const MIN_CLOSED_TRADES: usize = 3;

/// Source of executed trades.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TradeRepository: Send + Sync {
    /// All trades executed in `[start, end]`, across buckets.
    async fn get_trades_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>>;
}

/// Performance of one bucket over an evaluation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub bucket_id: String,
    pub period_days: u32,

    // Returns, percent
    pub total_return: f64,
    pub annualized_return: f64,

    // Risk, percent
    pub volatility: f64,
    pub downside_volatility: f64,
    pub max_drawdown: f64,

    // Risk-adjusted
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    // Trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,

    pub composite_score: f64,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>,
}

/// Compute metrics from already-fetched trades of one bucket.
///
/// Returns `None` when there are fewer than [`MIN_TRADES`] trades or they
/// close fewer than [`MIN_CLOSED_TRADES`] lots.
pub fn evaluate_trades(
    bucket_id: &str,
    trades: &[Trade],
    settings: &SatelliteSettings,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Option<PerformanceMetrics> {
    if trades.len() < MIN_TRADES {
        info!(
            bucket_id = %bucket_id,
            trade_count = trades.len(),
            "Insufficient trades for performance calculation"
        );
        return None;
    }

    let closed = match_trades(trades);
    if closed.len() < MIN_CLOSED_TRADES {
        info!(
            bucket_id = %bucket_id,
            closed_trade_count = closed.len(),
            "Insufficient closed trades for performance calculation"
        );
        return None;
    }

    Some(metrics_from_closed(
        bucket_id, &closed, settings, start_date, end_date,
    ))
}

fn metrics_from_closed(
    bucket_id: &str,
    closed: &[ClosedTrade],
    settings: &SatelliteSettings,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> PerformanceMetrics {
    let equity = equity_curve(closed);
    let returns: Vec<f64> = closed.iter().map(|c| c.return_pct).collect();
    let profit_losses: Vec<f64> = closed.iter().map(|c| c.profit_loss).collect();

    let capital = initial_capital(closed);
    let total_pnl = equity.last().copied().unwrap_or(0.0);
    let total_return = if capital > 0.0 {
        total_pnl / capital * 100.0
    } else {
        0.0
    };
    let period_days = settings.evaluation_period_days;
    let annualized_return = annualize(total_return / 100.0, f64::from(period_days)) * 100.0;

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let volatility = std_dev(&returns) * 100.0;
    let downside_volatility = std_dev(&downside) * 100.0;
    let max_drawdown_pct = max_drawdown(&equity).max_drawdown * 100.0;

    let sharpe = sharpe_ratio(&returns, settings.risk_free_rate);
    let sortino = sortino_ratio(&returns, settings.sortino_mar);
    let calmar = calmar_ratio(annualized_return, max_drawdown_pct);

    let (win_rate_pct, winning_trades, losing_trades) = win_rate(&profit_losses);
    let profit_factor = profit_factor(&profit_losses);

    let wins: Vec<f64> = profit_losses.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = profit_losses.iter().copied().filter(|p| *p < 0.0).collect();
    let avg = |values: &[f64]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    let largest_win = wins.iter().copied().fold(0.0, f64::max);
    let largest_loss = losses.iter().copied().fold(0.0, f64::min);

    let composite = composite_score(ScoreInputs {
        sharpe,
        sortino,
        profit_factor,
        win_rate: win_rate_pct,
        calmar,
    });

    info!(
        bucket_id = %bucket_id,
        closed_trades = closed.len(),
        total_return,
        sharpe,
        sortino,
        composite_score = composite,
        "Bucket performance calculated"
    );

    PerformanceMetrics {
        bucket_id: bucket_id.to_string(),
        period_days,
        total_return,
        annualized_return,
        volatility,
        downside_volatility,
        max_drawdown: max_drawdown_pct,
        sharpe_ratio: sharpe,
        sortino_ratio: sortino,
        calmar_ratio: calmar,
        total_trades: closed.len(),
        winning_trades,
        losing_trades,
        win_rate: win_rate_pct,
        profit_factor,
        avg_win: avg(&wins),
        avg_loss: avg(&losses),
        largest_win,
        largest_loss,
        composite_score: composite,
        start_date,
        end_date,
        calculated_at: Utc::now(),
    }
}

/// Fetches a bucket's trades and evaluates them.
#[derive(Clone)]
pub struct PerformanceService {
    trades: Arc<dyn TradeRepository>,
}

impl PerformanceService {
    pub fn new(trades: Arc<dyn TradeRepository>) -> Self {
        Self { trades }
    }

    pub async fn calculate_bucket_performance(
        &self,
        bucket_id: &str,
        settings: &SatelliteSettings,
    ) -> Result<Option<PerformanceMetrics>> {
        self.calculate_bucket_performance_at(bucket_id, settings, Utc::now())
            .await
    }

    /// Evaluate `[now - evaluation_period_days, now]`. `None` means insufficient data.
    pub async fn calculate_bucket_performance_at(
        &self,
        bucket_id: &str,
        settings: &SatelliteSettings,
        now: DateTime<Utc>,
    ) -> Result<Option<PerformanceMetrics>> {
        let start = now - Duration::days(i64::from(settings.evaluation_period_days));
        let bucket_trades: Vec<Trade> = self
            .trades
            .get_trades_in_range(start, now)
            .await?
            .into_iter()
            .filter(|t| t.bucket_id.as_deref() == Some(bucket_id))
            .collect();

        Ok(evaluate_trades(bucket_id, &bucket_trades, settings, start, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satellite_core::types::TradeSide;
    use satellite_core::Error;

    fn day(n: i64) -> DateTime<Utc> {
        Utc::now() - Duration::days(60) + Duration::days(n)
    }

    fn round_trips(bucket_id: &str, sells: &[f64]) -> Vec<Trade> {
        let mut trades = Vec::new();
        for (i, &sell) in sells.iter().enumerate() {
            let i = i as i64 * 2;
            trades.push(Trade::new("AAPL", TradeSide::Buy, 10.0, 100.0, day(i)).for_bucket(bucket_id));
            trades.push(Trade::new("AAPL", TradeSide::Sell, 10.0, sell, day(i + 1)).for_bucket(bucket_id));
        }
        trades
    }

    #[test]
    fn test_insufficient_data_is_none() {
        let settings = SatelliteSettings::new("s1");
        let four = round_trips("s1", &[110.0, 120.0])[..4].to_vec();
        assert!(evaluate_trades("s1", &four, &settings, day(0), day(10)).is_none());

        // Five trades but only two closed
        let mut trades = round_trips("s1", &[110.0, 120.0]);
        trades.push(Trade::new("MSFT", TradeSide::Buy, 1.0, 10.0, day(9)));
        assert!(evaluate_trades("s1", &trades, &settings, day(0), day(10)).is_none());
    }

    #[test]
    fn test_metrics_from_round_trips() {
        let settings = SatelliteSettings::new("s1");
        let trades = round_trips("s1", &[110.0, 95.0, 120.0, 105.0]);
        let metrics = evaluate_trades("s1", &trades, &settings, day(0), day(10)).unwrap();

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.winning_trades, 3);
        assert_eq!(metrics.losing_trades, 1);
        assert!((metrics.win_rate - 75.0).abs() < 1e-9);
        // pnl 100 - 50 + 200 + 50 = 300 on 4000 deployed
        assert!((metrics.total_return - 7.5).abs() < 1e-9);
        assert!((metrics.profit_factor - 7.0).abs() < 1e-9);
        assert!((metrics.largest_loss + 50.0).abs() < 1e-9);
        assert!((metrics.largest_win - 200.0).abs() < 1e-9);
        // equity 0,100,50,250,300: drawdown 50%
        assert!((metrics.max_drawdown - 50.0).abs() < 1e-9);
        assert!(metrics.composite_score.is_finite());
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[tokio::test]
    async fn test_service_filters_by_bucket_and_window() {
        let mut trades = round_trips("s1", &[110.0, 120.0, 130.0]);
        trades.extend(round_trips("other", &[50.0, 50.0, 50.0]));

        let mut repo = MockTradeRepository::new();
        repo.expect_get_trades_in_range()
            .withf(|start, end| (*end - *start).num_days() == 90)
            .times(1)
            .returning(move |_, _| Ok(trades.clone()));

        let service = PerformanceService::new(Arc::new(repo));
        let metrics = service
            .calculate_bucket_performance("s1", &SatelliteSettings::new("s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.losing_trades, 0);
        assert_eq!(metrics.profit_factor, f64::INFINITY);
        assert_eq!(metrics.period_days, 90);
    }

    #[tokio::test]
    async fn test_service_propagates_repository_errors() {
        let mut repo = MockTradeRepository::new();
        repo.expect_get_trades_in_range()
            .returning(|_, _| Err(Error::External("trade history unavailable".into())));

        let service = PerformanceService::new(Arc::new(repo));
        let result = service
            .calculate_bucket_performance("s1", &SatelliteSettings::new("s1"))
            .await;
        assert!(matches!(result, Err(Error::External(_))));
    }
}
