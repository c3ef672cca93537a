//! Unified error type for `SplitBuddy`.
//!
//! Every fallible operation in the crate returns [`Result`]. Reconciliation
//! problems found on receipts are not errors; they are reported through
//! [`crate::core::validator::ValidationReport`] next to a successful result.

use thiserror::Error;

/// All errors produced by the settlement engine and the bot layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings or environment could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A group, transaction, receipt or item is absent, or the caller is not a member
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Caller is not allowed to perform a creator-only or host-only action
    #[error("Not allowed: {action}")]
    Forbidden {
        /// The rejected action
        action: String,
    },

    /// The operation does not fit the current lifecycle state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Why the operation was rejected
        message: String,
    },

    /// A monetary amount is negative or above the sane upper bound
    #[error("Invalid amount: {cents} cents")]
    InvalidAmount {
        /// The offending amount in cents
        cents: i64,
    },

    /// Malformed user input (amount strings, receipt payloads)
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Why the input was rejected
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("Serenity/Poise framework error: {0}")]
    #[allow(clippy::enum_variant_names)]
    FrameworkError(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::FrameworkError(Box::new(value))
    }
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with any displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`Error::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Forbidden`].
    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
