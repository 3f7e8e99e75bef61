//! Win cooldown: trim aggression after an unusually strong run.
//!
//! The only persisted field is the cooldown start timestamp. Whether a
//! cooldown is active, when it ends and the multiplier it applies are all
//! recomputed from that timestamp on every evaluation.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use satellite_core::config::RiskConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for the win cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinCooldownConfig {
    /// Return over the lookback window that starts a cooldown (0.20 = 20%).
    pub trigger_return_pct: f64,
    /// Length of a cooldown in days.
    pub cooldown_days: i64,
    /// Fraction of aggression removed while cooling down.
    pub aggression_reduction: f64,
    /// Window the recent return is measured over, in days.
    pub lookback_days: i64,
}

impl Default for WinCooldownConfig {
    fn default() -> Self {
        Self {
            trigger_return_pct: 0.20,
            cooldown_days: 30,
            aggression_reduction: 0.25,
            lookback_days: 30,
        }
    }
}

impl From<&RiskConfig> for WinCooldownConfig {
    fn from(config: &RiskConfig) -> Self {
        Self {
            trigger_return_pct: config.cooldown_trigger_pct,
            cooldown_days: config.cooldown_days,
            aggression_reduction: config.cooldown_aggression_reduction,
            lookback_days: config.cooldown_lookback_days,
        }
    }
}

/// A bucket value observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub at: DateTime<Utc>,
    pub value: Decimal,
}

impl ValuePoint {
    pub fn new(at: DateTime<Utc>, value: Decimal) -> Self {
        Self { at, value }
    }
}

/// What changed in this evaluation and needs persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownTransition {
    /// Nothing to write.
    None,
    /// A new cooldown began; store `started_at`.
    Started,
    /// The stored cooldown ran out; clear it.
    Expired,
    /// The stored timestamp could not be parsed; clear it.
    Discarded,
}

/// Recomputed cooldown state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownStatus {
    pub in_cooldown: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub days_remaining: i64,
    /// Aggression multiplier, 1.0 outside a cooldown.
    pub multiplier: f64,
    pub recent_return: Option<f64>,
    pub transition: CooldownTransition,
}

impl CooldownStatus {
    fn inactive(recent_return: Option<f64>, transition: CooldownTransition) -> Self {
        Self {
            in_cooldown: false,
            started_at: None,
            ends_at: None,
            days_remaining: 0,
            multiplier: 1.0,
            recent_return,
            transition,
        }
    }
}

impl WinCooldownConfig {
    pub fn multiplier(&self) -> f64 {
        (1.0 - self.aggression_reduction).clamp(0.0, 1.0)
    }

    /// Return from the start of the lookback window to the latest observation.
    ///
    /// The baseline is the newest point at or before the window start, or the
    /// oldest point inside the window when history is shorter. `None` without
    /// two usable points or with a non-positive baseline.
    pub fn recent_return(&self, history: &[ValuePoint], now: DateTime<Utc>) -> Option<f64> {
        let window_start = now - Duration::days(self.lookback_days);
        let mut points: Vec<&ValuePoint> = history.iter().filter(|p| p.at <= now).collect();
        points.sort_by_key(|p| p.at);

        let latest = *points.last()?;
        let baseline = points
            .iter()
            .rev()
            .find(|p| p.at <= window_start)
            .or_else(|| points.iter().find(|p| p.at >= window_start))?;

        if baseline.at >= latest.at || baseline.value <= Decimal::ZERO {
            return None;
        }
        ((latest.value - baseline.value) / baseline.value).to_f64()
    }

    /// Parse a stored start; malformed values are treated as absent.
    pub fn parse_started_at(bucket_id: &str, stored: &str) -> Option<DateTime<Utc>> {
        match DateTime::parse_from_rfc3339(stored) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!(
                    bucket_id = %bucket_id,
                    value = %stored,
                    error = %e,
                    "Malformed cooldown timestamp, treating bucket as not in cooldown"
                );
                None
            }
        }
    }

    pub fn format_started_at(started_at: DateTime<Utc>) -> String {
        started_at.to_rfc3339()
    }

    /// Evaluate the cooldown for one bucket.
    ///
    /// An active stored cooldown wins over the trigger. Otherwise a recent
    /// return at or above the trigger starts a new cooldown at `now`.
    pub fn evaluate(
        &self,
        bucket_id: &str,
        stored_start: Option<&str>,
        recent_return: Option<f64>,
        now: DateTime<Utc>,
    ) -> CooldownStatus {
        let mut transition = CooldownTransition::None;

        if let Some(stored) = stored_start {
            match Self::parse_started_at(bucket_id, stored) {
                Some(started_at) => {
                    let ends_at = started_at + Duration::days(self.cooldown_days);
                    if now < ends_at {
                        return CooldownStatus {
                            in_cooldown: true,
                            started_at: Some(started_at),
                            ends_at: Some(ends_at),
                            days_remaining: (ends_at - now).num_days(),
                            multiplier: self.multiplier(),
                            recent_return,
                            transition: CooldownTransition::None,
                        };
                    }
                    info!(bucket_id = %bucket_id, "Win cooldown expired");
                    transition = CooldownTransition::Expired;
                }
                None => transition = CooldownTransition::Discarded,
            }
        }

        match recent_return {
            Some(ret) if ret >= self.trigger_return_pct => {
                let ends_at = now + Duration::days(self.cooldown_days);
                info!(
                    bucket_id = %bucket_id,
                    recent_return = ret,
                    cooldown_days = self.cooldown_days,
                    "Win cooldown triggered"
                );
                CooldownStatus {
                    in_cooldown: true,
                    started_at: Some(now),
                    ends_at: Some(ends_at),
                    days_remaining: self.cooldown_days,
                    multiplier: self.multiplier(),
                    recent_return,
                    transition: CooldownTransition::Started,
                }
            }
            _ => CooldownStatus::inactive(recent_return, transition),
        }
    }
}
