//! Composes the three throttles into one aggression multiplier per bucket.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use satellite_core::config::RiskConfig;
use satellite_core::types::RiskState;
use satellite_core::{BucketStore, Error, Result, RiskStateStore, SatelliteStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::aggression::{AggressionConfig, AggressionResult};
use crate::reawakening::{
    ReawakeningConfig, ReawakeningOutcome, ReawakeningState, ReawakeningStatus,
};
use crate::win_cooldown::{CooldownStatus, CooldownTransition, ValuePoint, WinCooldownConfig};

/// Configuration for all risk throttles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskControlConfig {
    pub aggression: AggressionConfig,
    pub win_cooldown: WinCooldownConfig,
    pub reawakening: ReawakeningConfig,
}

impl From<&RiskConfig> for RiskControlConfig {
    fn from(config: &RiskConfig) -> Self {
        Self {
            aggression: AggressionConfig::default(),
            win_cooldown: WinCooldownConfig::from(config),
            reawakening: ReawakeningConfig {
                stages: config.reawakening_stages,
            },
        }
    }
}

/// Full breakdown of one bucket's aggression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub bucket_id: String,
    pub base: AggressionResult,
    pub cooldown: CooldownStatus,
    pub reawakening: ReawakeningStatus,
    /// base x cooldown x reawakening, in [0, 1].
    pub aggression: f64,
    pub assessed_at: DateTime<Utc>,
}

/// Evaluates and persists per-bucket risk throttles.
pub struct RiskController {
    store: Arc<dyn SatelliteStore>,
    config: RiskControlConfig,
}

impl RiskController {
    pub fn new(store: Arc<dyn SatelliteStore>, config: RiskControlConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RiskControlConfig {
        &self.config
    }

    async fn load_state(&self, bucket_id: &str) -> Result<RiskState> {
        Ok(self
            .store
            .get_risk_state(bucket_id)
            .await?
            .unwrap_or_else(|| RiskState::new(bucket_id)))
    }

    async fn save_state(&self, mut state: RiskState) -> Result<()> {
        state.updated_at = Utc::now();
        if let Err(e) = self.store.save_risk_state(&state).await {
            error!(bucket_id = %state.bucket_id, error = %e, "Failed to persist risk state");
            return Err(e);
        }
        Ok(())
    }

    fn reawakening_from(&self, state: &RiskState) -> Option<ReawakeningState> {
        state.reawakening_stage.map(|stage| {
            ReawakeningState::restore(
                stage,
                state.reawakening_consecutive_wins,
                self.config.reawakening.stages,
            )
        })
    }

    /// Aggression for a bucket holding `current_value` against `target_value`.
    ///
    /// `history` feeds the win-cooldown trigger; an empty slice never triggers.
    pub async fn assess(
        &self,
        bucket_id: &str,
        current_value: Decimal,
        target_value: Decimal,
        history: &[ValuePoint],
    ) -> Result<RiskAssessment> {
        self.assess_at(bucket_id, current_value, target_value, history, Utc::now())
            .await
    }

    pub async fn assess_at(
        &self,
        bucket_id: &str,
        current_value: Decimal,
        target_value: Decimal,
        history: &[ValuePoint],
        now: DateTime<Utc>,
    ) -> Result<RiskAssessment> {
        let bucket = self
            .store
            .get_bucket(bucket_id)
            .await?
            .ok_or_else(|| Error::bucket_not_found(bucket_id))?;

        let high_water_mark =
            (bucket.high_water_mark > Decimal::ZERO).then_some(bucket.high_water_mark);
        let base = self
            .config
            .aggression
            .calculate(current_value, target_value, high_water_mark);

        let mut state = self.load_state(bucket_id).await?;
        let recent_return = self.config.win_cooldown.recent_return(history, now);
        let cooldown = self.config.win_cooldown.evaluate(
            bucket_id,
            state.cooldown_started_at.as_deref(),
            recent_return,
            now,
        );

        match cooldown.transition {
            CooldownTransition::None => {}
            CooldownTransition::Started => {
                state.cooldown_started_at = cooldown
                    .started_at
                    .map(WinCooldownConfig::format_started_at);
                self.save_state(state.clone()).await?;
            }
            CooldownTransition::Expired | CooldownTransition::Discarded => {
                state.cooldown_started_at = None;
                self.save_state(state.clone()).await?;
            }
        }

        let reawakening = ReawakeningStatus::from_state(
            self.reawakening_from(&state).as_ref(),
            self.config.reawakening.stages,
        );

        let aggression =
            (base.aggression * cooldown.multiplier * reawakening.multiplier).clamp(0.0, 1.0);

        debug!(
            bucket_id = %bucket_id,
            base = base.aggression,
            limiting_factor = base.limiting_factor.as_str(),
            cooldown = cooldown.multiplier,
            reawakening = reawakening.multiplier,
            aggression = aggression,
            "Assessed bucket aggression"
        );

        Ok(RiskAssessment {
            bucket_id: bucket_id.to_string(),
            base,
            cooldown,
            reawakening,
            aggression,
            assessed_at: now,
        })
    }

    /// Put a bucket into reawakening at stage 1.
    pub async fn start_reawakening(&self, bucket_id: &str) -> Result<ReawakeningStatus> {
        if self.store.get_bucket(bucket_id).await?.is_none() {
            return Err(Error::bucket_not_found(bucket_id));
        }

        let reawakening = ReawakeningState::new(self.config.reawakening.stages);
        let mut state = self.load_state(bucket_id).await?;
        state.reawakening_stage = Some(reawakening.current_stage);
        state.reawakening_consecutive_wins = 0;
        self.save_state(state).await?;

        info!(
            bucket_id = %bucket_id,
            stages = reawakening.total_stages,
            "Entered reawakening"
        );
        Ok(ReawakeningStatus::from_state(
            Some(&reawakening),
            self.config.reawakening.stages,
        ))
    }

    /// Feed a closed trade into reawakening. No-op outside reawakening.
    pub async fn record_reawakening_result(
        &self,
        bucket_id: &str,
        is_win: bool,
    ) -> Result<ReawakeningOutcome> {
        let mut state = self.load_state(bucket_id).await?;
        let Some(mut reawakening) = self.reawakening_from(&state) else {
            return Ok(ReawakeningOutcome::Inactive);
        };

        let outcome = reawakening.record_result(bucket_id, is_win);
        if outcome == ReawakeningOutcome::Completed {
            state.reawakening_stage = None;
            state.reawakening_consecutive_wins = 0;
        } else {
            state.reawakening_stage = Some(reawakening.current_stage);
            state.reawakening_consecutive_wins = reawakening.consecutive_wins;
        }
        self.save_state(state).await?;
        Ok(outcome)
    }

    pub async fn reawakening_status(&self, bucket_id: &str) -> Result<ReawakeningStatus> {
        let state = self.load_state(bucket_id).await?;
        Ok(ReawakeningStatus::from_state(
            self.reawakening_from(&state).as_ref(),
            self.config.reawakening.stages,
        ))
    }

    /// Drop any stored cooldown for a bucket.
    pub async fn clear_cooldown(&self, bucket_id: &str) -> Result<()> {
        let mut state = self.load_state(bucket_id).await?;
        if state.cooldown_started_at.take().is_some() {
            self.save_state(state).await?;
            info!(bucket_id = %bucket_id, "Cleared win cooldown");
        }
        Ok(())
    }
}
