//! Evidence module error types.

use thiserror::Error;

/// Errors that can occur while handling evidence verdicts and statuses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvidenceError {
    /// Invalid review verdict string.
    #[error("invalid review verdict: {value}")]
    InvalidVerdict {
        /// The invalid verdict string.
        value: String,
    },

    /// Invalid evidence status string.
    #[error("invalid evidence status: {value}")]
    InvalidStatus {
        /// The invalid status string.
        value: String,
    },
}
