//! Satellite strategy settings, presets, and the allocation settings snapshot.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hard ceiling on the share of the portfolio all satellites may hold.
pub const MAX_SATELLITE_BUDGET_PCT: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendHandling {
    #[default]
    ReinvestSame,
    SendToCore,
    AccumulateCash,
}

impl DividendHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            DividendHandling::ReinvestSame => "reinvest_same",
            DividendHandling::SendToCore => "send_to_core",
            DividendHandling::AccumulateCash => "accumulate_cash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reinvest_same" => Some(DividendHandling::ReinvestSame),
            "send_to_core" => Some(DividendHandling::SendToCore),
            "accumulate_cash" => Some(DividendHandling::AccumulateCash),
            _ => None,
        }
    }
}

/// Strategy sliders and risk-metric parameters for one satellite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSettings {
    pub satellite_id: String,
    pub preset: Option<String>,
    pub risk_appetite: f64,
    pub hold_duration: f64,
    pub entry_style: f64,
    pub position_spread: f64,
    pub profit_taking: f64,
    pub trailing_stops: bool,
    pub follow_regime: bool,
    pub auto_harvest: bool,
    pub pause_high_volatility: bool,
    pub dividend_handling: DividendHandling,
    pub risk_free_rate: f64,
    pub sortino_mar: f64,
    pub evaluation_period_days: u32,
    pub volatility_window: u32,
}

impl SatelliteSettings {
    pub fn new(satellite_id: impl Into<String>) -> Self {
        Self {
            satellite_id: satellite_id.into(),
            preset: None,
            risk_appetite: 0.5,
            hold_duration: 0.5,
            entry_style: 0.5,
            position_spread: 0.5,
            profit_taking: 0.5,
            trailing_stops: false,
            follow_regime: false,
            auto_harvest: false,
            pause_high_volatility: false,
            dividend_handling: DividendHandling::default(),
            risk_free_rate: 0.0,
            sortino_mar: 0.0,
            evaluation_period_days: 90,
            volatility_window: 60,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let sliders = [
            ("risk_appetite", self.risk_appetite),
            ("hold_duration", self.hold_duration),
            ("entry_style", self.entry_style),
            ("position_spread", self.position_spread),
            ("profit_taking", self.profit_taking),
        ];
        for (name, value) in sliders {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::validation(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.risk_free_rate) {
            return Err(Error::validation(format!(
                "risk_free_rate must be between 0.0 and 1.0, got {}",
                self.risk_free_rate
            )));
        }
        if !(-1.0..=1.0).contains(&self.sortino_mar) {
            return Err(Error::validation(format!(
                "sortino_mar must be between -1.0 and 1.0, got {}",
                self.sortino_mar
            )));
        }
        if !(1..=3650).contains(&self.evaluation_period_days) {
            return Err(Error::validation(format!(
                "evaluation_period_days must be between 1 and 3650, got {}",
                self.evaluation_period_days
            )));
        }
        if !(1..=3650).contains(&self.volatility_window) {
            return Err(Error::validation(format!(
                "volatility_window must be between 1 and 3650, got {}",
                self.volatility_window
            )));
        }
        Ok(())
    }

    /// Overwrite sliders and toggles with a named preset.
    pub fn apply_preset(&mut self, preset: &StrategyPreset) {
        self.preset = Some(preset.name.to_string());
        self.risk_appetite = preset.risk_appetite;
        self.hold_duration = preset.hold_duration;
        self.entry_style = preset.entry_style;
        self.position_spread = preset.position_spread;
        self.profit_taking = preset.profit_taking;
        self.trailing_stops = preset.trailing_stops;
        self.follow_regime = preset.follow_regime;
        self.auto_harvest = preset.auto_harvest;
        self.pause_high_volatility = preset.pause_high_volatility;
        self.dividend_handling = preset.dividend_handling;
    }
}

/// A named bundle of strategy sliders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub risk_appetite: f64,
    pub hold_duration: f64,
    pub entry_style: f64,
    pub position_spread: f64,
    pub profit_taking: f64,
    pub trailing_stops: bool,
    pub follow_regime: bool,
    pub auto_harvest: bool,
    pub pause_high_volatility: bool,
    pub dividend_handling: DividendHandling,
}

const PRESETS: &[StrategyPreset] = &[
    StrategyPreset {
        name: "aggressive",
        description: "High risk, concentrated positions, quick exits on momentum",
        risk_appetite: 0.8,
        hold_duration: 0.3,
        entry_style: 0.7,
        position_spread: 0.3,
        profit_taking: 0.6,
        trailing_stops: true,
        follow_regime: false,
        auto_harvest: false,
        pause_high_volatility: false,
        dividend_handling: DividendHandling::ReinvestSame,
    },
    StrategyPreset {
        name: "conservative",
        description: "Low risk, diversified positions, long holding periods",
        risk_appetite: 0.2,
        hold_duration: 0.7,
        entry_style: 0.3,
        position_spread: 0.8,
        profit_taking: 0.3,
        trailing_stops: false,
        follow_regime: true,
        auto_harvest: true,
        pause_high_volatility: true,
        dividend_handling: DividendHandling::SendToCore,
    },
    StrategyPreset {
        name: "momentum_hunter",
        description: "Buys breakouts and rides trends with trailing stops",
        risk_appetite: 0.7,
        hold_duration: 0.4,
        entry_style: 0.8,
        position_spread: 0.4,
        profit_taking: 0.5,
        trailing_stops: true,
        follow_regime: true,
        auto_harvest: false,
        pause_high_volatility: false,
        dividend_handling: DividendHandling::ReinvestSame,
    },
    StrategyPreset {
        name: "dividend_catcher",
        description: "Buys dips in income names and accumulates dividend cash",
        risk_appetite: 0.4,
        hold_duration: 0.2,
        entry_style: 0.3,
        position_spread: 0.6,
        profit_taking: 0.4,
        trailing_stops: false,
        follow_regime: false,
        auto_harvest: true,
        pause_high_volatility: true,
        dividend_handling: DividendHandling::AccumulateCash,
    },
    StrategyPreset {
        name: "balanced",
        description: "Middle of the road on every dimension",
        risk_appetite: 0.5,
        hold_duration: 0.5,
        entry_style: 0.5,
        position_spread: 0.5,
        profit_taking: 0.5,
        trailing_stops: false,
        follow_regime: false,
        auto_harvest: false,
        pause_high_volatility: false,
        dividend_handling: DividendHandling::ReinvestSame,
    },
];

impl StrategyPreset {
    pub fn all() -> &'static [StrategyPreset] {
        PRESETS
    }

    pub fn find(name: &str) -> Option<&'static StrategyPreset> {
        PRESETS.iter().find(|p| p.name == name)
    }
}

/// Keys of the `allocation_settings` table.
pub mod keys {
    pub const SATELLITE_BUDGET_PCT: &str = "satellite_budget_pct";
    pub const SATELLITE_MIN_PCT: &str = "satellite_min_pct";
    pub const SATELLITE_MAX_PCT: &str = "satellite_max_pct";
    pub const EVALUATION_MONTHS: &str = "evaluation_months";
    pub const REALLOCATION_DAMPENING: &str = "reallocation_dampening";
}

/// Immutable snapshot of the global allocation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub satellite_budget_pct: f64,
    pub satellite_min_pct: f64,
    pub satellite_max_pct: f64,
    pub evaluation_months: u32,
    pub reallocation_dampening: f64,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            satellite_budget_pct: 0.0,
            satellite_min_pct: 0.03,
            satellite_max_pct: 0.12,
            evaluation_months: 3,
            reallocation_dampening: 0.5,
        }
    }
}

impl AllocationSettings {
    /// Build a snapshot from raw key/value rows, falling back to defaults.
    pub fn from_values(values: &HashMap<String, f64>) -> Self {
        let defaults = Self::default();
        let get = |key: &str, default: f64| values.get(key).copied().unwrap_or(default);

        Self {
            satellite_budget_pct: get(keys::SATELLITE_BUDGET_PCT, defaults.satellite_budget_pct)
                .clamp(0.0, MAX_SATELLITE_BUDGET_PCT),
            satellite_min_pct: get(keys::SATELLITE_MIN_PCT, defaults.satellite_min_pct),
            satellite_max_pct: get(keys::SATELLITE_MAX_PCT, defaults.satellite_max_pct),
            evaluation_months: get(
                keys::EVALUATION_MONTHS,
                f64::from(defaults.evaluation_months),
            )
            .max(1.0) as u32,
            reallocation_dampening: get(
                keys::REALLOCATION_DAMPENING,
                defaults.reallocation_dampening,
            )
            .clamp(0.0, 1.0),
        }
    }

    /// Evaluation window used by the meta-allocator.
    pub fn evaluation_days(&self) -> i64 {
        i64::from(self.evaluation_months) * 30
    }
}
