//! Error types for the ticketing core

use thiserror::Error;

use crate::crypto::{EncryptionError, SigningError};

use super::LedgerError;

/// Errors surfaced by ticketing, escrow, refund and wallet operations
#[derive(Error, Debug)]
pub enum TicketingError {
    /// Caller supplied something unusable (bad payment state, memo mismatch, malformed key)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Entity exists but is in the wrong lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Entity not found
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Caller does not own the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Signature did not verify
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Ticket was already scanned
    #[error("ticket already used: {0}")]
    AlreadyUsed(String),

    /// Uniqueness conflict (wallet already linked elsewhere)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Ticket signing failed (misconfigured key)
    #[error("ticket signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis error (nonce store, notification queue)
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ledger, encryption or other infrastructure failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl TicketingError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

impl From<EncryptionError> for TicketingError {
    fn from(err: EncryptionError) -> Self {
        Self::Internal(format!("escrow secret unavailable: {}", err))
    }
}

impl From<LedgerError> for TicketingError {
    fn from(err: LedgerError) -> Self {
        Self::Internal(format!("ledger call failed: {}", err))
    }
}

/// Result type for ticketing operations
pub type Result<T> = std::result::Result<T, TicketingError>;
