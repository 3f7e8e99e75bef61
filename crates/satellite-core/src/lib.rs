//! Satellite Core Library
//!
//! Shared types, store traits, and database models for the core/satellite
//! capital allocator.

pub mod cash;
pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod types;

pub use db::PgSatelliteStore;
pub use error::{Error, Result};
pub use store::{
    BucketStore, CashManager, LedgerStore, MemorySatelliteStore, RiskStateStore, SatelliteStore,
    SettingsStore,
};
