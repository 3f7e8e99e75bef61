//! Bucket entity and its lifecycle state machine.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the singleton core bucket.
pub const CORE_BUCKET_ID: &str = "core";

/// Default number of consecutive losses before a satellite is paused.
pub const DEFAULT_MAX_CONSECUTIVE_LOSSES: u32 = 5;

/// Minimum allocation assumed on resume when a bucket has none recorded.
const RESUME_MIN_PCT_FALLBACK: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketType {
    Core,
    Satellite,
}

impl BucketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketType::Core => "core",
            BucketType::Satellite => "satellite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "core" => Some(BucketType::Core),
            "satellite" => Some(BucketType::Satellite),
            _ => None,
        }
    }
}

/// Lifecycle status of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStatus {
    /// Being evaluated, no capital yet.
    Research,
    /// Building up toward its minimum allocation.
    Accumulating,
    /// Fully trading.
    Active,
    /// Dormant but keeps its positions.
    Hibernating,
    /// Halted manually or by the loss-streak breaker.
    Paused,
    /// Permanently closed.
    Retired,
}

impl BucketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketStatus::Research => "research",
            BucketStatus::Accumulating => "accumulating",
            BucketStatus::Active => "active",
            BucketStatus::Hibernating => "hibernating",
            BucketStatus::Paused => "paused",
            BucketStatus::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(BucketStatus::Research),
            "accumulating" => Some(BucketStatus::Accumulating),
            "active" => Some(BucketStatus::Active),
            "hibernating" => Some(BucketStatus::Hibernating),
            "paused" => Some(BucketStatus::Paused),
            "retired" => Some(BucketStatus::Retired),
            _ => None,
        }
    }

    /// Whether a bucket in this status receives deposits.
    pub fn receives_deposits(&self) -> bool {
        matches!(self, BucketStatus::Active | BucketStatus::Accumulating)
    }
}

impl fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A portfolio sub-account: the shared core or a satellite strategy sleeve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub bucket_type: BucketType,
    pub notes: Option<String>,
    pub status: BucketStatus,
    pub target_pct: Option<f64>,
    pub min_pct: Option<f64>,
    pub max_pct: Option<f64>,
    pub consecutive_losses: u32,
    pub max_consecutive_losses: u32,
    pub high_water_mark: Decimal,
    pub high_water_mark_date: Option<DateTime<Utc>>,
    pub loss_streak_paused_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bucket {
    /// The singleton core bucket.
    pub fn core() -> Self {
        let now = Utc::now();
        Self {
            id: CORE_BUCKET_ID.to_string(),
            name: "Core".to_string(),
            bucket_type: BucketType::Core,
            notes: None,
            status: BucketStatus::Active,
            target_pct: None,
            min_pct: None,
            max_pct: None,
            consecutive_losses: 0,
            max_consecutive_losses: DEFAULT_MAX_CONSECUTIVE_LOSSES,
            high_water_mark: Decimal::ZERO,
            high_water_mark_date: None,
            loss_streak_paused_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new satellite starting with no allocation.
    pub fn satellite(
        id: impl Into<String>,
        name: impl Into<String>,
        status: BucketStatus,
        min_pct: f64,
        max_pct: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            bucket_type: BucketType::Satellite,
            notes: None,
            status,
            target_pct: Some(0.0),
            min_pct: Some(min_pct),
            max_pct: Some(max_pct),
            consecutive_losses: 0,
            max_consecutive_losses: DEFAULT_MAX_CONSECUTIVE_LOSSES,
            high_water_mark: Decimal::ZERO,
            high_water_mark_date: None,
            loss_streak_paused_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_core(&self) -> bool {
        self.bucket_type == BucketType::Core
    }

    pub fn is_satellite(&self) -> bool {
        self.bucket_type == BucketType::Satellite
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// research | accumulating -> active.
    pub fn activate(&mut self) -> Result<()> {
        if !self.is_satellite() {
            return Err(Error::invalid_transition(format!(
                "Cannot activate {}: only satellites can be activated",
                self.id
            )));
        }
        if !matches!(
            self.status,
            BucketStatus::Research | BucketStatus::Accumulating
        ) {
            return Err(Error::invalid_transition(format!(
                "Cannot activate satellite {} in status {}",
                self.id, self.status
            )));
        }
        self.status = BucketStatus::Active;
        self.touch();
        Ok(())
    }

    /// Any non-retired, non-paused status -> paused.
    pub fn pause(&mut self) -> Result<()> {
        match self.status {
            BucketStatus::Retired => Err(Error::invalid_transition(format!(
                "Cannot pause retired bucket {}",
                self.id
            ))),
            BucketStatus::Paused => Err(Error::invalid_transition(format!(
                "Bucket {} is already paused",
                self.id
            ))),
            _ => {
                self.status = BucketStatus::Paused;
                self.touch();
                Ok(())
            }
        }
    }

    /// paused -> active when the target meets the minimum (always for core),
    /// otherwise accumulating.
    pub fn resume(&mut self) -> Result<()> {
        if self.status != BucketStatus::Paused {
            return Err(Error::invalid_transition(format!(
                "Cannot resume bucket {} from status {}",
                self.id, self.status
            )));
        }
        let target = self.target_pct.unwrap_or(0.0);
        let min = self.min_pct.unwrap_or(RESUME_MIN_PCT_FALLBACK);
        self.status = if self.is_core() || target >= min {
            BucketStatus::Active
        } else {
            BucketStatus::Accumulating
        };
        self.touch();
        Ok(())
    }

    /// active | accumulating | paused -> hibernating. Never the core.
    pub fn hibernate(&mut self) -> Result<()> {
        if self.is_core() {
            return Err(Error::invalid_transition("Cannot hibernate core bucket"));
        }
        if !matches!(
            self.status,
            BucketStatus::Active | BucketStatus::Accumulating | BucketStatus::Paused
        ) {
            return Err(Error::invalid_transition(format!(
                "Cannot hibernate bucket {} in status {}",
                self.id, self.status
            )));
        }
        self.status = BucketStatus::Hibernating;
        self.touch();
        Ok(())
    }

    /// paused -> retired, satellites only. Cash must already be moved out.
    pub fn retire(&mut self) -> Result<()> {
        if !self.is_satellite() {
            return Err(Error::invalid_transition("Cannot retire core bucket"));
        }
        if self.status != BucketStatus::Paused {
            return Err(Error::invalid_transition(format!(
                "Satellite {} must be paused before retiring (status: {})",
                self.id, self.status
            )));
        }
        self.status = BucketStatus::Retired;
        self.touch();
        Ok(())
    }

    /// Feed a closed trade into the loss-streak breaker.
    ///
    /// Returns true when this loss tripped the breaker and paused the bucket.
    pub fn record_trade_result(&mut self, is_win: bool) -> bool {
        self.touch();
        if is_win {
            self.consecutive_losses = 0;
            self.loss_streak_paused_at = None;
            return false;
        }

        self.consecutive_losses += 1;
        if self.consecutive_losses >= self.max_consecutive_losses
            && self.status != BucketStatus::Paused
            && self.status != BucketStatus::Retired
        {
            self.status = BucketStatus::Paused;
            self.loss_streak_paused_at = Some(self.updated_at);
            return true;
        }
        false
    }

    /// Raise the high-water mark if `current` strictly exceeds it.
    pub fn update_high_water_mark(&mut self, current: Decimal) -> bool {
        if current <= self.high_water_mark {
            return false;
        }
        self.high_water_mark = current;
        self.touch();
        self.high_water_mark_date = Some(self.updated_at);
        true
    }

    /// Fractional decline of `current` from the high-water mark, 0 without a mark.
    pub fn drawdown(&self, current: Decimal) -> f64 {
        drawdown_from(self.high_water_mark, current)
    }

    /// Set a new target allocation.
    ///
    /// Above the maximum is rejected. Below the minimum is allowed; callers
    /// check [`Bucket::is_below_min`] to warn.
    pub fn set_target_pct(&mut self, target_pct: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&target_pct) {
            return Err(Error::validation(format!(
                "target allocation {:.1}% must be between 0% and 100%",
                target_pct * 100.0
            )));
        }
        if let Some(max) = self.max_pct {
            if target_pct > max {
                return Err(Error::validation(format!(
                    "target {:.2}% exceeds max {:.2}%",
                    target_pct * 100.0,
                    max * 100.0
                )));
            }
        }
        self.target_pct = Some(target_pct);
        self.touch();
        Ok(())
    }

    pub fn is_below_min(&self) -> bool {
        match (self.target_pct, self.min_pct) {
            (Some(target), Some(min)) => target < min,
            _ => false,
        }
    }
}

/// max(0, (hwm - current) / hwm), or 0 when the mark is not positive.
pub fn drawdown_from(high_water_mark: Decimal, current: Decimal) -> f64 {
    if high_water_mark <= Decimal::ZERO {
        return 0.0;
    }
    let drawdown = (high_water_mark - current) / high_water_mark;
    drawdown.max(Decimal::ZERO).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused_satellite() -> Bucket {
        let mut b = Bucket::satellite("momentum", "Momentum", BucketStatus::Active, 0.03, 0.12);
        b.pause().unwrap();
        b
    }

    #[test]
    fn test_activate_only_from_research_or_accumulating() {
        let mut b = Bucket::satellite("s1", "S1", BucketStatus::Research, 0.03, 0.12);
        assert!(b.activate().is_ok());
        assert_eq!(b.status, BucketStatus::Active);
        assert!(b.activate().is_err());

        let mut core = Bucket::core();
        assert!(core.activate().is_err());
    }

    #[test]
    fn test_pause_rejects_retired_and_paused() {
        let mut b = paused_satellite();
        assert!(matches!(b.pause(), Err(Error::InvalidTransition(_))));
        b.retire().unwrap();
        assert!(b.pause().is_err());
    }

    #[test]
    fn test_resume_picks_status_from_target() {
        let mut b = paused_satellite();
        b.resume().unwrap();
        // target 0 is below min 0.03
        assert_eq!(b.status, BucketStatus::Accumulating);

        let mut b = paused_satellite();
        b.target_pct = Some(0.05);
        b.resume().unwrap();
        assert_eq!(b.status, BucketStatus::Active);

        let mut b = Bucket::satellite("s", "S", BucketStatus::Active, 0.03, 0.12);
        assert!(b.resume().is_err());
    }

    #[test]
    fn test_hibernate_rules() {
        let mut core = Bucket::core();
        assert!(core.hibernate().is_err());

        let mut research = Bucket::satellite("r", "R", BucketStatus::Research, 0.03, 0.12);
        assert!(research.hibernate().is_err());

        let mut b = paused_satellite();
        assert!(b.hibernate().is_ok());
        assert_eq!(b.status, BucketStatus::Hibernating);
        assert!(b.hibernate().is_err());
    }

    #[test]
    fn test_retire_requires_paused_satellite() {
        let mut active = Bucket::satellite("a", "A", BucketStatus::Active, 0.03, 0.12);
        assert!(active.retire().is_err());

        let mut core = Bucket::core();
        core.status = BucketStatus::Paused;
        assert!(core.retire().is_err());

        let mut b = paused_satellite();
        assert!(b.retire().is_ok());
        assert_eq!(b.status, BucketStatus::Retired);
    }

    #[test]
    fn test_loss_streak_trips_and_win_resets() {
        let mut b = Bucket::satellite("s", "S", BucketStatus::Active, 0.03, 0.12);
        b.max_consecutive_losses = 3;

        assert!(!b.record_trade_result(false));
        assert!(!b.record_trade_result(false));
        assert!(b.record_trade_result(false));
        assert_eq!(b.status, BucketStatus::Paused);
        assert!(b.loss_streak_paused_at.is_some());

        assert!(!b.record_trade_result(true));
        assert_eq!(b.consecutive_losses, 0);
        assert!(b.loss_streak_paused_at.is_none());
        // A win does not resume the bucket
        assert_eq!(b.status, BucketStatus::Paused);
    }

    #[test]
    fn test_high_water_mark_is_monotonic() {
        let mut b = Bucket::satellite("s", "S", BucketStatus::Active, 0.03, 0.12);
        assert!(b.update_high_water_mark(Decimal::new(1000, 0)));
        assert!(!b.update_high_water_mark(Decimal::new(1000, 0)));
        assert!(!b.update_high_water_mark(Decimal::new(900, 0)));
        assert_eq!(b.high_water_mark, Decimal::new(1000, 0));
        assert!(b.high_water_mark_date.is_some());

        assert!((b.drawdown(Decimal::new(850, 0)) - 0.15).abs() < 1e-12);
        assert_eq!(b.drawdown(Decimal::new(1200, 0)), 0.0);
    }

    #[test]
    fn test_drawdown_without_mark_is_zero() {
        assert_eq!(drawdown_from(Decimal::ZERO, Decimal::new(100, 0)), 0.0);
        assert_eq!(drawdown_from(Decimal::new(-5, 0), Decimal::new(100, 0)), 0.0);
    }

    #[test]
    fn test_set_target_enforces_max_only() {
        let mut b = Bucket::satellite("s", "S", BucketStatus::Active, 0.03, 0.12);
        assert!(b.set_target_pct(0.01).is_ok());
        assert!(b.is_below_min());

        let err = b.set_target_pct(0.15).unwrap_err();
        assert!(err.to_string().contains("exceeds max"));
        assert_eq!(b.target_pct, Some(0.01));

        assert!(b.set_target_pct(-0.1).is_err());
    }

    #[test]
    fn test_status_string_mapping() {
        for status in [
            BucketStatus::Research,
            BucketStatus::Accumulating,
            BucketStatus::Active,
            BucketStatus::Hibernating,
            BucketStatus::Paused,
            BucketStatus::Retired,
        ] {
            assert_eq!(BucketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BucketStatus::parse("unknown"), None);
    }
}
