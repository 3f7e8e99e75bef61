//! Core types for the satellite allocator.

mod balance;
mod bucket;
mod risk;
mod settings;
mod trade;

pub use balance::*;
pub use bucket::*;
pub use risk::*;
pub use settings::*;
pub use trade::*;
