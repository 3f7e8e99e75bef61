//! Risk Manager
//!
//! Per-bucket aggression: an allocation/drawdown base scaled down by the win
//! cooldown and graduated reawakening throttles.

pub mod aggression;
pub mod controller;
pub mod reawakening;
pub mod win_cooldown;

pub use aggression::{calculate_aggression, AggressionConfig, AggressionResult, LimitingFactor};
pub use controller::{RiskAssessment, RiskControlConfig, RiskController};
pub use reawakening::{ReawakeningConfig, ReawakeningOutcome, ReawakeningState, ReawakeningStatus};
pub use win_cooldown::{CooldownStatus, CooldownTransition, ValuePoint, WinCooldownConfig};
