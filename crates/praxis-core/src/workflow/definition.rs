//! Typed workflow definitions.
//!
//! A [`WorkflowDefinition`] is plain data: an adjacency table of legal
//! transitions, a map from target state to ledger event name, and a table of
//! guard functions. Definitions are built once at process start (see
//! [`WorkflowSet::standard`]) and injected into the engine; there is no
//! process-global workflow state and no string switching on entity kinds.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::WorkflowError;
use super::guards;
use super::state::{ApplicationState, OpportunityState, WorkflowState};
use crate::actor::Actor;
use crate::ledger::EntityType;
use crate::store::{Application, Opportunity, StoreError, sql};

/// Authority predicate supplied by the access-control layer.
///
/// The engine consults it after path validation and before guards; the core
/// does not implement role rules itself (e.g. "only the institution admin
/// may certify"); it only enforces that the predicate holds.
pub trait TransitionAuthorizer: Send + Sync {
    /// Whether `actor` may move `opportunity` to `target`.
    fn can_transition_opportunity(
        &self,
        actor: &Actor,
        opportunity: &Opportunity,
        target: OpportunityState,
    ) -> bool;

    /// Whether `actor` may move `application` to `target`.
    fn can_transition_application(
        &self,
        actor: &Actor,
        application: &Application,
        target: ApplicationState,
    ) -> bool;
}

/// Authorizer that permits everything; for tests and trusted callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TransitionAuthorizer for AllowAll {
    fn can_transition_opportunity(
        &self,
        _actor: &Actor,
        _opportunity: &Opportunity,
        _target: OpportunityState,
    ) -> bool {
        true
    }

    fn can_transition_application(
        &self,
        _actor: &Actor,
        _application: &Application,
        _target: ApplicationState,
    ) -> bool {
        true
    }
}

/// An entity kind the workflow engine can drive.
///
/// Implementations bind a state enum to the store functions that load and
/// persist the entity, and to the matching [`TransitionAuthorizer`] method.
pub trait WorkflowEntity: Clone + Send + Sync {
    /// The entity's state enum.
    type State: WorkflowState;

    /// Ledger entity type tag for this kind.
    const ENTITY_TYPE: EntityType;

    /// The entity's id.
    fn id(&self) -> Uuid;

    /// The entity's current state.
    fn status(&self) -> Self::State;

    /// Loads the entity inside the engine's transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no row exists.
    fn load(conn: &Connection, id: Uuid) -> Result<Self, StoreError>;

    /// Persists a version-checked status change.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` on a lost race.
    fn persist_status(
        &self,
        conn: &Connection,
        next: Self::State,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError>;

    /// Dispatches to the authorizer method for this kind.
    fn authorize(
        authorizer: &dyn TransitionAuthorizer,
        actor: &Actor,
        entity: &Self,
        target: Self::State,
    ) -> bool;
}

impl WorkflowEntity for Opportunity {
    type State = OpportunityState;

    const ENTITY_TYPE: EntityType = EntityType::Opportunity;

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> OpportunityState {
        self.status
    }

    fn load(conn: &Connection, id: Uuid) -> Result<Self, StoreError> {
        sql::load_opportunity(conn, id)
    }

    fn persist_status(
        &self,
        conn: &Connection,
        next: OpportunityState,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        sql::update_opportunity_status(conn, self, next, now)
    }

    fn authorize(
        authorizer: &dyn TransitionAuthorizer,
        actor: &Actor,
        entity: &Self,
        target: OpportunityState,
    ) -> bool {
        authorizer.can_transition_opportunity(actor, entity, target)
    }
}

impl WorkflowEntity for Application {
    type State = ApplicationState;

    const ENTITY_TYPE: EntityType = EntityType::Application;

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> ApplicationState {
        self.status
    }

    fn load(conn: &Connection, id: Uuid) -> Result<Self, StoreError> {
        sql::load_application(conn, id)
    }

    fn persist_status(
        &self,
        conn: &Connection,
        next: ApplicationState,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        sql::update_application_status(conn, self, next, now)
    }

    fn authorize(
        authorizer: &dyn TransitionAuthorizer,
        actor: &Actor,
        entity: &Self,
        target: ApplicationState,
    ) -> bool {
        authorizer.can_transition_application(actor, entity, target)
    }
}

/// Guard condition evaluated inside the transition's transaction.
pub type Guard<E> = fn(&Connection, &E) -> Result<(), WorkflowError>;

/// Transition table, event-name map, and guard table for one entity kind.
pub struct WorkflowDefinition<E: WorkflowEntity> {
    transitions: Vec<(E::State, Vec<E::State>)>,
    event_names: Vec<(E::State, &'static str)>,
    guards: Vec<(E::State, Guard<E>)>,
}

impl<E: WorkflowEntity> WorkflowDefinition<E> {
    /// Creates an empty definition.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transitions: Vec::new(),
            event_names: Vec::new(),
            guards: Vec::new(),
        }
    }

    /// Declares the legal targets from one state (builder pattern).
    #[must_use]
    pub fn with_transitions(mut self, from: E::State, targets: &[E::State]) -> Self {
        self.transitions.push((from, targets.to_vec()));
        self
    }

    /// Maps a target state to its ledger event name (builder pattern).
    #[must_use]
    pub fn with_event_name(mut self, state: E::State, event_name: &'static str) -> Self {
        self.event_names.push((state, event_name));
        self
    }

    /// Attaches a guard to a target state (builder pattern).
    #[must_use]
    pub fn with_guard(mut self, state: E::State, guard: Guard<E>) -> Self {
        self.guards.push((state, guard));
        self
    }

    /// Legal targets from `from`; empty for terminal states.
    #[must_use]
    pub fn successors(&self, from: E::State) -> &[E::State] {
        self.transitions
            .iter()
            .find(|(state, _)| *state == from)
            .map_or(&[], |(_, targets)| targets.as_slice())
    }

    /// Whether `state` has no outgoing transitions.
    #[must_use]
    pub fn is_terminal(&self, state: E::State) -> bool {
        self.successors(state).is_empty()
    }

    /// Validates that `to` is reachable from `from` in one step.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidTransition` otherwise.
    pub fn ensure_allowed(&self, from: E::State, to: E::State) -> Result<(), WorkflowError> {
        if self.successors(from).contains(&to) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                entity_type: E::ENTITY_TYPE,
                from: from.as_str(),
                to: to.as_str(),
            })
        }
    }

    /// Ledger event name for a transition into `state`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::MissingEventName` if the definition maps no
    /// name for the state.
    pub fn event_name(&self, state: E::State) -> Result<&'static str, WorkflowError> {
        self.event_names
            .iter()
            .find(|(mapped, _)| *mapped == state)
            .map(|(_, name)| *name)
            .ok_or(WorkflowError::MissingEventName {
                state: state.as_str(),
            })
    }

    /// Guards attached to transitions into `state`.
    pub fn guards_for(&self, state: E::State) -> impl Iterator<Item = &Guard<E>> {
        self.guards
            .iter()
            .filter(move |(guarded, _)| *guarded == state)
            .map(|(_, guard)| guard)
    }
}

impl<E: WorkflowEntity> Default for WorkflowDefinition<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// The workflow definitions for both entity kinds, built at startup.
pub struct WorkflowSet {
    /// Opportunity lifecycle definition.
    pub opportunity: WorkflowDefinition<Opportunity>,

    /// Application lifecycle definition.
    pub application: WorkflowDefinition<Application>,
}

impl WorkflowSet {
    /// Builds the standard placement workflows.
    ///
    /// Opportunity: DRAFT→OPEN, OPEN→CLOSED, CLOSED→OPEN (re-opening is
    /// permitted). Application: APPLIED→SHORTLISTED→ACCEPTED→ACTIVE→
    /// COMPLETED→CERTIFIED with REJECTED/TERMINATED exits along the way;
    /// REJECTED, TERMINATED, and CERTIFIED are terminal. Completion is
    /// guarded on the evidence aggregate.
    #[must_use]
    pub fn standard() -> Self {
        use ApplicationState as A;
        use OpportunityState as O;

        let opportunity = WorkflowDefinition::new()
            .with_transitions(O::Draft, &[O::Open])
            .with_transitions(O::Open, &[O::Closed])
            .with_transitions(O::Closed, &[O::Open])
            .with_event_name(O::Open, "opportunity.opened")
            .with_event_name(O::Closed, "opportunity.closed");

        let application = WorkflowDefinition::new()
            .with_transitions(A::Applied, &[A::Shortlisted, A::Rejected, A::Terminated])
            .with_transitions(A::Shortlisted, &[A::Accepted, A::Rejected, A::Terminated])
            .with_transitions(A::Accepted, &[A::Active, A::Terminated])
            .with_transitions(A::Active, &[A::Completed, A::Terminated])
            .with_transitions(A::Completed, &[A::Certified])
            .with_event_name(A::Shortlisted, "application.shortlisted")
            .with_event_name(A::Accepted, "application.accepted")
            .with_event_name(A::Active, "application.activated")
            .with_event_name(A::Completed, "application.completed")
            .with_event_name(A::Certified, "application.certified")
            .with_event_name(A::Rejected, "application.rejected")
            .with_event_name(A::Terminated, "application.terminated")
            .with_guard(A::Completed, guards::completion_requires_settled_evidence);

        Self {
            opportunity,
            application,
        }
    }
}

impl Default for WorkflowSet {
    fn default() -> Self {
        Self::standard()
    }
}
