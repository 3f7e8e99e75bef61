//! Performance-weighted redistribution of the satellite budget.
//!
//! Each satellite is scored, scores are shifted so the weakest still gets
//! a small weight, the budget is split proportionally, every target is
//! clamped to the configured min/max, the move from the current target is
//! dampened, and the results are rescaled so they sum to the budget again.

use chrono::{DateTime, Utc};
use satellite_core::types::{AllocationSettings, Bucket, BucketStatus, SatelliteSettings};
use satellite_core::{BucketStore, Result, SatelliteStore, SettingsStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics::PerformanceService;

/// Added to every shifted score so the weakest satellite keeps some weight.
const SCORE_EPSILON: f64 = 0.01;

/// Adjustments smaller than this are reported as "No significant change".
const SIGNIFICANT_ADJUSTMENT: f64 = 0.005;

/// Adjustments beyond this count a satellite as improved or reduced.
const COUNTED_ADJUSTMENT: f64 = 0.0001;

/// Dampening used by [`MetaAllocator::preview`].
pub const PREVIEW_DAMPENING: f64 = 0.5;

/// Input to the allocation math for one satellite.
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteScore {
    pub bucket_id: String,
    pub current_pct: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecommendation {
    pub bucket_id: String,
    pub current_allocation_pct: f64,
    /// Clamped target before dampening.
    pub target_allocation_pct: f64,
    /// After dampening and renormalization.
    pub new_allocation_pct: f64,
    pub adjustment_pct: f64,
    pub performance_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReallocationResult {
    pub total_satellite_budget: f64,
    pub recommendations: Vec<AllocationRecommendation>,
    pub dampening_factor: f64,
    pub evaluation_period_days: i64,
    pub satellites_evaluated: usize,
    pub satellites_improved: usize,
    pub satellites_reduced: usize,
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
}

/// Pure allocation step over already-computed scores.
///
/// The returned `new_allocation_pct` values always sum to `budget_pct`.
pub fn calculate_allocations(
    satellites: &[SatelliteScore],
    budget_pct: f64,
    min_pct: f64,
    max_pct: f64,
    dampening: f64,
) -> Vec<AllocationRecommendation> {
    if satellites.is_empty() {
        return Vec::new();
    }

    let min_score = satellites
        .iter()
        .map(|s| s.score)
        .fold(f64::INFINITY, f64::min);
    let normalized: Vec<f64> = satellites
        .iter()
        .map(|s| s.score - min_score + SCORE_EPSILON)
        .collect();
    let total_score: f64 = normalized.iter().sum();
    let count = satellites.len() as f64;

    let mut recommendations: Vec<AllocationRecommendation> = satellites
        .iter()
        .zip(&normalized)
        .map(|(satellite, &weight)| {
            let raw_target = if total_score > 0.0 {
                weight / total_score * budget_pct
            } else {
                budget_pct / count
            };
            let target = raw_target.max(min_pct).min(max_pct);
            let new_pct =
                satellite.current_pct + (target - satellite.current_pct) * dampening;

            AllocationRecommendation {
                bucket_id: satellite.bucket_id.clone(),
                current_allocation_pct: satellite.current_pct,
                target_allocation_pct: target,
                new_allocation_pct: new_pct,
                adjustment_pct: 0.0,
                performance_score: satellite.score,
                reason: String::new(),
            }
        })
        .collect();

    let total_new: f64 = recommendations.iter().map(|r| r.new_allocation_pct).sum();
    if total_new > 0.0 {
        let scale = budget_pct / total_new;
        for rec in &mut recommendations {
            rec.new_allocation_pct *= scale;
        }
    } else {
        for rec in &mut recommendations {
            rec.new_allocation_pct = budget_pct / count;
        }
    }

    for rec in &mut recommendations {
        rec.adjustment_pct = rec.new_allocation_pct - rec.current_allocation_pct;
        rec.reason = reason_for(rec.adjustment_pct, rec.performance_score);
    }
    recommendations
}

fn reason_for(adjustment: f64, score: f64) -> String {
    if adjustment.abs() < SIGNIFICANT_ADJUSTMENT {
        "No significant change".to_string()
    } else if adjustment > 0.0 {
        if score > 0.0 {
            format!("Increased due to strong performance (score: {:.2})", score)
        } else {
            "Increased to maintain minimum allocation".to_string()
        }
    } else if score < 0.0 {
        format!("Reduced due to weak performance (score: {:.2})", score)
    } else {
        "Reduced to enforce maximum allocation".to_string()
    }
}

/// Scores satellites and optionally persists new target allocations.
pub struct MetaAllocator {
    store: Arc<dyn SatelliteStore>,
    performance: PerformanceService,
}

impl MetaAllocator {
    pub fn new(store: Arc<dyn SatelliteStore>, performance: PerformanceService) -> Self {
        Self { store, performance }
    }

    /// Dry run with the configured evaluation window and dampening 0.5.
    pub async fn preview(&self) -> Result<ReallocationResult> {
        let settings = self.store.allocation_settings().await?;
        self.evaluate_and_reallocate(&settings, PREVIEW_DAMPENING, false)
            .await
    }

    /// Compute and persist new targets. Uses the configured dampening when
    /// `dampening` is `None`.
    pub async fn apply(&self, dampening: Option<f64>) -> Result<ReallocationResult> {
        let settings = self.store.allocation_settings().await?;
        let dampening = dampening
            .unwrap_or(settings.reallocation_dampening)
            .clamp(0.0, 1.0);
        self.evaluate_and_reallocate(&settings, dampening, true)
            .await
    }

    pub async fn evaluate_and_reallocate(
        &self,
        settings: &AllocationSettings,
        dampening: f64,
        apply: bool,
    ) -> Result<ReallocationResult> {
        let evaluation_days = settings.evaluation_days();

        let satellites: Vec<Bucket> = self
            .store
            .list_buckets()
            .await?
            .into_iter()
            .filter(|b| b.is_satellite() && b.status != BucketStatus::Retired)
            .collect();

        if satellites.is_empty() {
            info!("No satellites to evaluate");
        }

        let mut scores = Vec::with_capacity(satellites.len());
        for satellite in &satellites {
            let score = self.score(satellite, evaluation_days).await;
            scores.push(SatelliteScore {
                bucket_id: satellite.id.clone(),
                current_pct: satellite.target_pct.unwrap_or(0.0),
                score,
            });
        }

        let recommendations = calculate_allocations(
            &scores,
            settings.satellite_budget_pct,
            settings.satellite_min_pct,
            settings.satellite_max_pct,
            dampening,
        );

        if apply {
            for (rec, satellite) in recommendations.iter().zip(&satellites) {
                self.persist(satellite, rec).await?;
            }
        }

        let improved = recommendations
            .iter()
            .filter(|r| r.adjustment_pct > COUNTED_ADJUSTMENT)
            .count();
        let reduced = recommendations
            .iter()
            .filter(|r| r.adjustment_pct < -COUNTED_ADJUSTMENT)
            .count();

        info!(
            satellites = satellites.len(),
            improved,
            reduced,
            budget = settings.satellite_budget_pct,
            dampening,
            applied = apply,
            "Meta-allocation evaluated"
        );

        Ok(ReallocationResult {
            total_satellite_budget: settings.satellite_budget_pct,
            recommendations,
            dampening_factor: dampening,
            evaluation_period_days: evaluation_days,
            satellites_evaluated: satellites.len(),
            satellites_improved: improved,
            satellites_reduced: reduced,
            applied: apply,
            timestamp: Utc::now(),
        })
    }

    /// Composite score over the evaluation window, 0.0 when unavailable.
    async fn score(&self, satellite: &Bucket, evaluation_days: i64) -> f64 {
        let mut settings = match self.store.get_settings(&satellite.id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => SatelliteSettings::new(&satellite.id),
            Err(e) => {
                warn!(bucket_id = %satellite.id, error = %e, "Failed to load settings, using defaults");
                SatelliteSettings::new(&satellite.id)
            }
        };
        settings.evaluation_period_days = u32::try_from(evaluation_days).unwrap_or(u32::MAX);

        match self
            .performance
            .calculate_bucket_performance(&satellite.id, &settings)
            .await
        {
            Ok(Some(metrics)) => metrics.composite_score,
            Ok(None) => {
                warn!(
                    bucket_id = %satellite.id,
                    "Insufficient data for evaluation, using neutral score"
                );
                0.0
            }
            Err(e) => {
                error!(bucket_id = %satellite.id, error = %e, "Error calculating performance");
                0.0
            }
        }
    }

    async fn persist(&self, satellite: &Bucket, rec: &AllocationRecommendation) -> Result<()> {
        let mut bucket = satellite.clone();
        bucket.target_pct = Some(rec.new_allocation_pct);
        bucket.updated_at = Utc::now();
        self.store.update_bucket(&bucket).await?;

        let below_min = bucket.min_pct.is_some_and(|min| rec.new_allocation_pct < min);
        let above_max = bucket.max_pct.is_some_and(|max| rec.new_allocation_pct > max);
        if below_min || above_max {
            warn!(
                bucket_id = %bucket.id,
                new_pct = rec.new_allocation_pct,
                min_pct = ?bucket.min_pct,
                max_pct = ?bucket.max_pct,
                "Renormalized allocation outside bucket limits"
            );
        }
        info!(
            bucket_id = %bucket.id,
            old_pct = rec.current_allocation_pct,
            new_pct = rec.new_allocation_pct,
            adjustment = rec.adjustment_pct,
            reason = %rec.reason,
            "Allocation updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MockTradeRepository, TradeRepository};
    use chrono::Duration;
    use satellite_core::types::{keys, Trade, TradeSide};
    use satellite_core::MemorySatelliteStore;
    use std::collections::HashMap;

    const EPS: f64 = 1e-9;

    fn score(id: &str, current: f64, score: f64) -> SatelliteScore {
        SatelliteScore {
            bucket_id: id.to_string(),
            current_pct: current,
            score,
        }
    }

    fn total(recs: &[AllocationRecommendation]) -> f64 {
        recs.iter().map(|r| r.new_allocation_pct).sum()
    }

    #[test]
    fn test_weights_follow_scores() {
        let sats = [score("a", 0.05, 2.0), score("b", 0.05, 0.0)];
        let recs = calculate_allocations(&sats, 0.10, 0.0, 1.0, 1.0);
        // normalized 2.01 and 0.01
        assert!((recs[0].target_allocation_pct - 0.10 * 2.01 / 2.02).abs() < EPS);
        assert!(recs[0].new_allocation_pct > recs[1].new_allocation_pct);
        assert!((total(&recs) - 0.10).abs() < EPS);
        assert!(recs[0].reason.starts_with("Increased due to strong performance (score: 2.00)"));
        assert_eq!(recs[1].reason, "Reduced to enforce maximum allocation");
    }

    #[test]
    fn test_equal_scores_split_equally() {
        let sats = [score("a", 0.0, 0.0), score("b", 0.0, 0.0), score("c", 0.0, 0.0)];
        let recs = calculate_allocations(&sats, 0.09, 0.0, 1.0, 0.5);
        for rec in &recs {
            assert!((rec.new_allocation_pct - 0.03).abs() < EPS);
            assert_eq!(rec.reason, "Increased to maintain minimum allocation");
        }
    }

    #[test]
    fn test_clamp_then_dampen_then_renormalize() {
        let sats = [
            score("a", 0.10, 5.0),
            score("b", 0.05, -1.0),
            score("c", 0.05, 0.5),
        ];
        let recs = calculate_allocations(&sats, 0.20, 0.03, 0.12, 0.5);
        assert!(recs[0].target_allocation_pct <= 0.12 + EPS);
        assert!(recs[1].target_allocation_pct >= 0.03 - EPS);
        assert!((total(&recs) - 0.20).abs() < EPS);
        // b is clamped up to 0.03, dampened to 0.04 and scaled below its current 0.05
        assert!(recs[1].adjustment_pct < 0.0);
        assert_eq!(recs[1].reason, "Reduced due to weak performance (score: -1.00)");
    }

    #[test]
    fn test_renormalization_holds_for_any_scores() {
        let cases: [&[f64]; 4] = [
            &[0.0, 0.0, 0.0, 0.0],
            &[10.0, -10.0, 3.0, 0.5],
            &[f64::MAX / 1e10, 0.0, 1.0, 2.0],
            &[-3.0, -2.0, -1.0, -0.5],
        ];
        for scores in cases {
            let sats: Vec<SatelliteScore> = scores
                .iter()
                .enumerate()
                .map(|(i, &s)| score(&format!("s{i}"), 0.02 * i as f64, s))
                .collect();
            for dampening in [0.0, 0.5, 1.0] {
                let recs = calculate_allocations(&sats, 0.25, 0.03, 0.12, dampening);
                assert!((total(&recs) - 0.25).abs() < 1e-9, "scores {scores:?}");
            }
        }
    }

    #[test]
    fn test_zero_budget_and_no_satellites() {
        assert!(calculate_allocations(&[], 0.2, 0.03, 0.12, 0.5).is_empty());

        let sats = [score("a", 0.05, 1.0), score("b", 0.0, 0.0)];
        let recs = calculate_allocations(&sats, 0.0, 0.03, 0.12, 0.5);
        assert!(recs.iter().all(|r| r.new_allocation_pct == 0.0));
    }

    fn winning_trades(bucket_id: &str) -> Vec<Trade> {
        let base = Utc::now() - Duration::days(20);
        let mut trades = Vec::new();
        for (i, sell) in [110.0, 104.0, 115.0, 98.0].into_iter().enumerate() {
            let day = base + Duration::days(i as i64 * 2);
            trades.push(Trade::new("SPY", TradeSide::Buy, 1.0, 100.0, day).for_bucket(bucket_id));
            trades.push(
                Trade::new("SPY", TradeSide::Sell, 1.0, sell, day + Duration::days(1))
                    .for_bucket(bucket_id),
            );
        }
        trades
    }

    async fn allocator(trades: Vec<Trade>) -> (MetaAllocator, Arc<MemorySatelliteStore>) {
        let store = Arc::new(MemorySatelliteStore::with_allocation(HashMap::from([
            (keys::SATELLITE_BUDGET_PCT.to_string(), 0.20),
            (keys::SATELLITE_MIN_PCT.to_string(), 0.03),
            (keys::SATELLITE_MAX_PCT.to_string(), 0.15),
        ])));
        store.insert_bucket(&Bucket::core()).await.unwrap();
        for id in ["alpha", "beta"] {
            let mut bucket = Bucket::satellite(id, id, BucketStatus::Active, 0.03, 0.15);
            bucket.target_pct = Some(0.10);
            store.insert_bucket(&bucket).await.unwrap();
        }
        store
            .insert_bucket(&Bucket::satellite("gone", "Gone", BucketStatus::Retired, 0.03, 0.15))
            .await
            .unwrap();

        let mut repo = MockTradeRepository::new();
        repo.expect_get_trades_in_range()
            .returning(move |_, _| Ok(trades.clone()));
        let repo: Arc<dyn TradeRepository> = Arc::new(repo);

        let allocator = MetaAllocator::new(store.clone(), PerformanceService::new(repo));
        (allocator, store)
    }

    #[tokio::test]
    async fn test_preview_does_not_persist() {
        let (allocator, store) = allocator(winning_trades("alpha")).await;
        let result = allocator.preview().await.unwrap();

        assert!(!result.applied);
        assert_eq!(result.satellites_evaluated, 2);
        assert_eq!(result.dampening_factor, PREVIEW_DAMPENING);
        assert_eq!(result.evaluation_period_days, 90);
        let alpha = &result.recommendations[0];
        assert_eq!(alpha.bucket_id, "alpha");
        assert!(alpha.performance_score > 0.0);
        assert!(alpha.adjustment_pct > 0.0);
        assert_eq!(result.satellites_improved, 1);
        assert_eq!(result.satellites_reduced, 1);

        let stored = store.get_bucket("alpha").await.unwrap().unwrap();
        assert_eq!(stored.target_pct, Some(0.10));
    }

    #[tokio::test]
    async fn test_apply_persists_targets() {
        let (allocator, store) = allocator(winning_trades("alpha")).await;
        let result = allocator.apply(Some(1.0)).await.unwrap();
        assert!(result.applied);

        let mut persisted = 0.0;
        for rec in &result.recommendations {
            let bucket = store.get_bucket(&rec.bucket_id).await.unwrap().unwrap();
            assert_eq!(bucket.target_pct, Some(rec.new_allocation_pct));
            persisted += rec.new_allocation_pct;
        }
        assert!((persisted - 0.20).abs() < EPS);

        let retired = store.get_bucket("gone").await.unwrap().unwrap();
        assert_eq!(retired.target_pct, Some(0.0));
    }
}
