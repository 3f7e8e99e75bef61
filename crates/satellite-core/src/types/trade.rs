//! Executed trades as reported by the trade history collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub executed_at: DateTime<Utc>,
    pub bucket_id: Option<String>,
    pub value_in_base_currency: Option<f64>,
}

impl Trade {
    pub fn new(
        symbol: impl Into<String>,
        side: TradeSide,
        quantity: f64,
        price: f64,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
            executed_at,
            bucket_id: None,
            value_in_base_currency: None,
        }
    }

    pub fn for_bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.bucket_id = Some(bucket_id.into());
        self
    }

    pub fn is_buy(&self) -> bool {
        self.side == TradeSide::Buy
    }
}
