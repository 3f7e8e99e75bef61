//! Graduated reawakening after a loss-streak pause.
//!
//! A bucket re-enters trading at a fraction of its normal size and earns
//! back one stage per consecutive win. Any loss drops it back to stage 1.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for reawakening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReawakeningConfig {
    /// Number of stages (4 stages = 25%, 50%, 75%, 100%).
    pub stages: u32,
}

impl Default for ReawakeningConfig {
    fn default() -> Self {
        Self { stages: 4 }
    }
}

/// Outcome of feeding one trade result into reawakening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReawakeningOutcome {
    /// Not reawakening; nothing changed.
    Inactive,
    /// A win moved the bucket up one stage.
    Advanced,
    /// The final win restored full size and ended reawakening.
    Completed,
    /// A loss sent the bucket back to stage 1.
    Reset,
}

/// Live reawakening progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReawakeningState {
    /// Current stage (1 to total_stages).
    pub current_stage: u32,
    pub total_stages: u32,
    /// Wins since entering the current run of stages.
    pub consecutive_wins: u32,
}

impl ReawakeningState {
    /// Enter reawakening at stage 1.
    pub fn new(total_stages: u32) -> Self {
        Self {
            current_stage: 1,
            total_stages: total_stages.max(1),
            consecutive_wins: 0,
        }
    }

    /// Rebuild from persisted fields.
    pub fn restore(stage: u32, consecutive_wins: u32, total_stages: u32) -> Self {
        let total_stages = total_stages.max(1);
        Self {
            current_stage: stage.clamp(1, total_stages),
            total_stages,
            consecutive_wins,
        }
    }

    /// Size multiplier for the current stage (0.0 to 1.0).
    pub fn capacity_pct(&self) -> f64 {
        f64::from(self.current_stage) / f64::from(self.total_stages)
    }

    pub fn is_fully_recovered(&self) -> bool {
        self.current_stage >= self.total_stages
    }

    /// Advance on a win, reset on a loss.
    pub fn record_result(&mut self, bucket_id: &str, is_win: bool) -> ReawakeningOutcome {
        if !is_win {
            let from_stage = self.current_stage;
            self.current_stage = 1;
            self.consecutive_wins = 0;
            info!(bucket_id = %bucket_id, from_stage = from_stage, "Reawakening reset after loss");
            return ReawakeningOutcome::Reset;
        }

        self.consecutive_wins += 1;
        self.current_stage += 1;
        if self.is_fully_recovered() {
            info!(bucket_id = %bucket_id, "Reawakening complete, full size restored");
            return ReawakeningOutcome::Completed;
        }

        info!(
            bucket_id = %bucket_id,
            stage = self.current_stage,
            capacity = self.capacity_pct(),
            "Reawakening advanced"
        );
        ReawakeningOutcome::Advanced
    }
}

/// Snapshot reported by the risk controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReawakeningStatus {
    pub in_reawakening: bool,
    pub current_stage: Option<u32>,
    pub total_stages: u32,
    pub consecutive_wins: u32,
    /// Aggression multiplier, 1.0 outside reawakening.
    pub multiplier: f64,
}

impl ReawakeningStatus {
    pub fn from_state(state: Option<&ReawakeningState>, total_stages: u32) -> Self {
        match state {
            Some(s) => Self {
                in_reawakening: true,
                current_stage: Some(s.current_stage),
                total_stages: s.total_stages,
                consecutive_wins: s.consecutive_wins,
                multiplier: s.capacity_pct(),
            },
            None => Self {
                in_reawakening: false,
                current_stage: None,
                total_stages,
                consecutive_wins: 0,
                multiplier: 1.0,
            },
        }
    }
}
