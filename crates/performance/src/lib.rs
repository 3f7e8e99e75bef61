//! Performance
//!
//! FIFO realized-P&L metrics per bucket and the meta-allocator that turns
//! them into satellite target allocations.

pub mod lots;
pub mod meta_allocator;
pub mod metrics;
pub mod ratios;

pub use lots::{match_trades, ClosedTrade};
pub use meta_allocator::{
    calculate_allocations, AllocationRecommendation, MetaAllocator, ReallocationResult,
    SatelliteScore,
};
pub use metrics::{evaluate_trades, PerformanceMetrics, PerformanceService, TradeRepository};
pub use ratios::{composite_score, ScoreInputs};
