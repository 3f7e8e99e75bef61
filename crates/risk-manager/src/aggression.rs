//! Base aggression from allocation fill and drawdown.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use satellite_core::types::drawdown_from;
use serde::{Deserialize, Serialize};

/// Which input capped the final aggression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitingFactor {
    Allocation,
    Drawdown,
    /// Both inputs gave the same value.
    Equal,
}

impl LimitingFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitingFactor::Allocation => "allocation",
            LimitingFactor::Drawdown => "drawdown",
            LimitingFactor::Equal => "equal",
        }
    }
}

/// Breakpoint tables for the two aggression inputs.
///
/// Allocation steps are `(below pct_of_target, aggression)`, checked in
/// order; at or above the last step aggression is 1.0. Drawdown steps are
/// `(at or above drawdown, aggression)`, checked in order; below all of
/// them aggression is 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggressionConfig {
    pub allocation_steps: Vec<(f64, f64)>,
    pub drawdown_steps: Vec<(f64, f64)>,
}

impl Default for AggressionConfig {
    fn default() -> Self {
        Self {
            allocation_steps: vec![(0.40, 0.0), (0.60, 0.4), (0.80, 0.6), (1.00, 0.8)],
            drawdown_steps: vec![(0.35, 0.0), (0.25, 0.3), (0.15, 0.7)],
        }
    }
}

/// Result of one aggression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggressionResult {
    pub aggression: f64,
    pub allocation_aggression: f64,
    pub drawdown_aggression: f64,
    pub pct_of_target: f64,
    pub drawdown: f64,
    pub limiting_factor: LimitingFactor,
}

impl AggressionConfig {
    pub fn allocation_aggression(&self, pct_of_target: f64) -> f64 {
        self.allocation_steps
            .iter()
            .find(|(below, _)| pct_of_target < *below)
            .map(|(_, aggression)| *aggression)
            .unwrap_or(1.0)
    }

    pub fn drawdown_aggression(&self, drawdown: f64) -> f64 {
        self.drawdown_steps
            .iter()
            .find(|(at_least, _)| drawdown >= *at_least)
            .map(|(_, aggression)| *aggression)
            .unwrap_or(1.0)
    }

    /// Aggression for a bucket holding `current` against a `target` value.
    ///
    /// A non-positive target counts as 0% of target. Without a high-water
    /// mark drawdown is 0.
    pub fn calculate(
        &self,
        current: Decimal,
        target: Decimal,
        high_water_mark: Option<Decimal>,
    ) -> AggressionResult {
        let pct_of_target = if target > Decimal::ZERO {
            (current / target).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let drawdown = high_water_mark
            .map(|hwm| drawdown_from(hwm, current))
            .unwrap_or(0.0);

        let allocation_aggression = self.allocation_aggression(pct_of_target);
        let drawdown_aggression = self.drawdown_aggression(drawdown);

        let limiting_factor = if allocation_aggression < drawdown_aggression {
            LimitingFactor::Allocation
        } else if drawdown_aggression < allocation_aggression {
            LimitingFactor::Drawdown
        } else {
            LimitingFactor::Equal
        };

        AggressionResult {
            aggression: allocation_aggression.min(drawdown_aggression),
            allocation_aggression,
            drawdown_aggression,
            pct_of_target,
            drawdown,
            limiting_factor,
        }
    }
}

/// [`AggressionConfig::calculate`] with the default breakpoints.
pub fn calculate_aggression(
    current: Decimal,
    target: Decimal,
    high_water_mark: Option<Decimal>,
) -> AggressionResult {
    AggressionConfig::default().calculate(current, target, high_water_mark)
}
