//! Ledger module error types.

use thiserror::Error;

use crate::canonical::CanonicalizeError;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload could not be canonicalized.
    #[error("payload canonicalization failed: {0}")]
    Canonicalize(#[from] CanonicalizeError),

    /// Attempted to overwrite the hash of an already-hashed event.
    #[error("cannot rewrite hash of event {id}: ledger is append-only")]
    AppendOnlyViolation {
        /// The event id whose hash rewrite was rejected.
        id: i64,
    },

    /// The chain head has no stored hash, so the chain cannot be extended.
    ///
    /// The backfill commits in the same transaction as the insert, so this
    /// indicates external tampering, not an in-flight write.
    #[error("chain head event {id} has no stored hash")]
    UnhashedChainHead {
        /// The head event id.
        id: i64,
    },

    /// Invalid entity type string.
    #[error("invalid entity type: {value}")]
    InvalidEntityType {
        /// The invalid entity type string.
        value: String,
    },
}
