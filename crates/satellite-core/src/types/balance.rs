//! Balance ledger records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Decimal places kept for ledger amounts, matching `NUMERIC(20, 8)`.
pub const AMOUNT_SCALE: u32 = 8;

/// Cash held by one bucket in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBalance {
    pub bucket_id: String,
    pub currency: String,
    pub balance: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Kind of ledger movement recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Reallocation,
    TradeBuy,
    TradeSell,
    Dividend,
    TransferIn,
    TransferOut,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Reallocation => "reallocation",
            TransactionType::TradeBuy => "trade_buy",
            TransactionType::TradeSell => "trade_sell",
            TransactionType::Dividend => "dividend",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "reallocation" => Some(TransactionType::Reallocation),
            "trade_buy" => Some(TransactionType::TradeBuy),
            "trade_sell" => Some(TransactionType::TradeSell),
            "dividend" => Some(TransactionType::Dividend),
            "transfer_in" => Some(TransactionType::TransferIn),
            "transfer_out" => Some(TransactionType::TransferOut),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit row written alongside every balance change.
///
/// `amount` is the signed delta actually applied to the balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTransaction {
    pub id: i64,
    pub bucket_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How a ledger entry changes a balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMutation {
    /// Add a signed delta, creating the row at zero if absent.
    Adjust(Decimal),
    /// Overwrite the balance; the recorded amount is the resulting delta.
    Set(Decimal),
}

/// One balance change plus the transaction row recording it.
///
/// A slice of entries is applied atomically by [`crate::LedgerStore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub bucket_id: String,
    pub currency: String,
    pub mutation: BalanceMutation,
    pub transaction_type: TransactionType,
    pub description: Option<String>,
    /// Reject the whole batch if this entry would leave the balance negative.
    pub require_funds: bool,
}

impl LedgerEntry {
    pub fn adjust(
        bucket_id: impl Into<String>,
        currency: impl Into<String>,
        delta: Decimal,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            currency: currency.into(),
            mutation: BalanceMutation::Adjust(delta),
            transaction_type,
            description: None,
            require_funds: false,
        }
    }

    pub fn set(
        bucket_id: impl Into<String>,
        currency: impl Into<String>,
        balance: Decimal,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            currency: currency.into(),
            mutation: BalanceMutation::Set(balance),
            transaction_type,
            description: None,
            require_funds: false,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn require_funds(mut self) -> Self {
        self.require_funds = true;
        self
    }

    /// Delta this entry applies to a row currently holding `current`.
    pub fn delta_from(&self, current: Decimal) -> Decimal {
        match self.mutation {
            BalanceMutation::Adjust(delta) => delta,
            BalanceMutation::Set(balance) => balance - current,
        }
    }
}

/// Filter for querying ledger transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub bucket_id: Option<String>,
    pub currency: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(mut self, bucket_id: impl Into<String>) -> Self {
        self.bucket_id = Some(bucket_id.into());
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn matches(&self, tx: &BucketTransaction) -> bool {
        if let Some(ref bucket_id) = self.bucket_id {
            if &tx.bucket_id != bucket_id {
                return false;
            }
        }
        if let Some(ref currency) = self.currency {
            if &tx.currency != currency {
                return false;
            }
        }
        if let Some(transaction_type) = self.transaction_type {
            if tx.transaction_type != transaction_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if tx.created_at < since {
                return false;
            }
        }
        true
    }
}

/// bucket_id -> currency -> balance.
pub type PortfolioSummary = BTreeMap<String, BTreeMap<String, Decimal>>;
