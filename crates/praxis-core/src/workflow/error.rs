//! Workflow module error types.

use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{EntityType, LedgerError};
use crate::store::StoreError;

/// Errors that can occur during workflow operations.
///
/// Variants are discriminated so calling code can branch on kind without
/// string matching: an [`InvalidTransition`](Self::InvalidTransition) is
/// never retried, an [`Unauthorized`](Self::Unauthorized) maps to a
/// permission response, a [`GuardViolation`](Self::GuardViolation) carries
/// its human-readable reason.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// Target state is not reachable from the current state.
    #[error("invalid transition for {entity_type}: {from} -> {to}")]
    InvalidTransition {
        /// The entity kind.
        entity_type: EntityType,
        /// The current state.
        from: &'static str,
        /// The requested target state.
        to: &'static str,
    },

    /// Actor lacks authority for the requested operation.
    #[error("actor {actor_id} is not allowed to {action}")]
    Unauthorized {
        /// The acting participant.
        actor_id: Uuid,
        /// The denied action, for diagnostics.
        action: String,
    },

    /// Domain-specific precondition unmet.
    #[error("{reason}")]
    GuardViolation {
        /// Human-readable reason.
        reason: String,
    },

    /// Invalid workflow state string.
    #[error("invalid workflow state: {value}")]
    InvalidState {
        /// The invalid state string.
        value: String,
    },

    /// Caller-supplied extra payload was not a JSON object.
    #[error("transition payload must be a JSON object")]
    PayloadNotAnObject,

    /// A state reachable by transition has no ledger event name mapped.
    ///
    /// Indicates a miswired [`WorkflowDefinition`](super::WorkflowDefinition),
    /// not a caller mistake.
    #[error("no ledger event name mapped for state {state}")]
    MissingEventName {
        /// The unmapped state.
        state: &'static str,
    },

    /// Entity store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ledger enqueue failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl WorkflowError {
    /// Convenience constructor for guard violations.
    #[must_use]
    pub fn guard(reason: impl Into<String>) -> Self {
        Self::GuardViolation {
            reason: reason.into(),
        }
    }
}
