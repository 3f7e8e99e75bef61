//! Satellite Allocator: core/satellite capital allocation
//!
//! This is the root crate that provides benchmark access to the internal modules.
//! For actual functionality, use the individual crates directly:
//!
//! - `satellite-core`: Core types, store traits, Postgres and in-memory stores
//! - `risk-manager`: Aggression, win cooldown, graduated reawakening
//! - `bucket-ledger`: Bucket lifecycle, balance ledger, reconciliation
//! - `performance`: FIFO trade metrics and the meta-allocator

// Re-export for benchmarks
pub use bucket_ledger as ledger;
pub use performance;
pub use risk_manager as risk;
pub use satellite_core as core;
