//! Typed workflow engine for placement lifecycles.
//!
//! Two state machines govern the platform: the Opportunity lifecycle
//! (DRAFT/OPEN/CLOSED) and the Application lifecycle (APPLIED through
//! CERTIFIED, with REJECTED/TERMINATED exits). Both are defined as data (an
//! adjacency table, an event-name map, and a guard table in a
//! [`WorkflowDefinition`]) and executed by the [`PlacementEngine`].
//!
//! # Transition algorithm
//!
//! Each transition short-circuits through, in order:
//!
//! 1. **Path validation**: the target must be adjacent to the current state.
//! 2. **Authority**: the injected [`TransitionAuthorizer`] predicate must
//!    hold; role rules live in the access-control layer, not here.
//! 3. **Guards**: entity-specific preconditions, read in the same
//!    transaction as the mutation (completion requires a settled evidence
//!    trail).
//! 4. **Mutation**: version-checked status update; a lost race surfaces as
//!    an invalid transition against the fresh status.
//! 5. **Ledger**: the mapped event is enqueued in the same transaction and
//!    appended after commit.
//!
//! A failed step leaves no mutation and no ledger trace.

mod definition;
mod engine;
mod error;
mod guards;
mod state;


pub use definition::{
    AllowAll, Guard, TransitionAuthorizer, WorkflowDefinition, WorkflowEntity, WorkflowSet,
};
pub use engine::PlacementEngine;
pub use error::WorkflowError;
pub use state::{ApplicationState, OpportunityState, WorkflowState};
