//! Bucket Ledger
//!
//! Services over a [`satellite_core::SatelliteStore`]:
//! - Bucket lifecycle, loss-streak breaker and strategy settings
//! - Virtual cash ledger with atomic settlements, transfers and deposit splits
//! - Reconciliation of virtual balances against the brokerage

pub mod balance_service;
pub mod bucket_service;
pub mod exchange;
pub mod reconciliation;

pub use balance_service::BalanceService;
pub use bucket_service::BucketService;
pub use exchange::CurrencyExchangeService;
pub use reconciliation::{
    DiscrepancyDiagnosis, ReconciliationResult, ReconciliationService,
    DEFAULT_AUTO_CORRECT_THRESHOLD,
};
