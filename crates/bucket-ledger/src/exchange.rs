//! Currency conversion collaborator.

use rust_decimal::Decimal;
use satellite_core::Result;

/// Source of FX rates used to value non-base-currency cash.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CurrencyExchangeService: Send + Sync {
    /// Units of `to` per one unit of `from`.
    async fn get_rate(&self, from: &str, to: &str) -> Result<Decimal>;
}
