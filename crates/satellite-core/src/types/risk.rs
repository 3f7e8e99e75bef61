//! Persisted per-bucket risk throttle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The minimal fields the risk controls keep between evaluations.
///
/// The cooldown start is stored as text so a corrupt value can be detected
/// and ignored instead of failing the read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskState {
    pub bucket_id: String,
    pub cooldown_started_at: Option<String>,
    /// Current reawakening stage, absent when not reawakening.
    pub reawakening_stage: Option<u32>,
    pub reawakening_consecutive_wins: u32,
    pub updated_at: DateTime<Utc>,
}

impl RiskState {
    pub fn new(bucket_id: impl Into<String>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            cooldown_started_at: None,
            reawakening_stage: None,
            reawakening_consecutive_wins: 0,
            updated_at: Utc::now(),
        }
    }
}
