//! Error types for the satellite allocator.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Out-of-range input or non-positive amount. Nothing was changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lifecycle operation not allowed from the bucket's current status.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error(
        "Insufficient funds in {bucket_id}: has {available} {currency}, needs {required} {currency}"
    )]
    InsufficientFunds {
        bucket_id: String,
        currency: String,
        available: Decimal,
        required: Decimal,
    },

    /// Failure reported by an external collaborator (exchange rates, trade history).
    #[error("External service error: {0}")]
    External(String),
}

impl Error {
    pub fn bucket_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "bucket",
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Error::InvalidTransition(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
