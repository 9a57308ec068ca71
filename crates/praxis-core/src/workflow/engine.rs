//! The placement workflow engine.
//!
//! [`PlacementEngine`] executes every business-significant mutation:
//! lifecycle transitions for both entity kinds, plus the operations that
//! create entities and record evidence verdicts and feedback. Each operation
//! runs in one transaction: validation, authority, guards, the
//! version-checked mutation, and the ledger outbox enqueue commit or abort
//! together, so a rejected operation is a no-op with no ledger trace.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;

use super::definition::{TransitionAuthorizer, WorkflowDefinition, WorkflowEntity, WorkflowSet};
use super::error::WorkflowError;
use super::state::{ApplicationState, OpportunityState, WorkflowState};
use crate::actor::Actor;
use crate::evidence::{ReviewVerdict, aggregate_status};
use crate::ledger::{EntityType, EventDraft, writer};
use crate::store::{Application, Database, Evidence, Opportunity, StoreError, sql};

/// Reviewing party recording a verdict on an evidence artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewParty {
    Employer,
    Institution,
}

/// Executes placement workflow operations against the store and the ledger.
pub struct PlacementEngine {
    db: Database,
    workflows: WorkflowSet,
    authorizer: Arc<dyn TransitionAuthorizer>,
}

impl PlacementEngine {
    /// Creates an engine over the given database, workflow definitions, and
    /// authority predicate.
    #[must_use]
    pub fn new(
        db: Database,
        workflows: WorkflowSet,
        authorizer: Arc<dyn TransitionAuthorizer>,
    ) -> Self {
        Self {
            db,
            workflows,
            authorizer,
        }
    }

    /// The underlying database handle.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Moves an opportunity to `target`.
    ///
    /// # Errors
    ///
    /// See [`WorkflowError`] for the failure taxonomy.
    pub fn transition_opportunity(
        &self,
        id: Uuid,
        target: OpportunityState,
        actor: &Actor,
        extra: Option<Value>,
    ) -> Result<Opportunity, WorkflowError> {
        self.transition(&self.workflows.opportunity, id, target, actor, extra)
    }

    /// Moves an application to `target`.
    ///
    /// # Errors
    ///
    /// See [`WorkflowError`] for the failure taxonomy.
    pub fn transition_application(
        &self,
        id: Uuid,
        target: ApplicationState,
        actor: &Actor,
        extra: Option<Value>,
    ) -> Result<Application, WorkflowError> {
        self.transition(&self.workflows.application, id, target, actor, extra)
    }

    /// Generic transition: path validation, authority, guards, mutation,
    /// ledger. Each step short-circuits, all inside one transaction.
    fn transition<E: WorkflowEntity>(
        &self,
        definition: &WorkflowDefinition<E>,
        id: Uuid,
        target: E::State,
        actor: &Actor,
        extra: Option<Value>,
    ) -> Result<E, WorkflowError> {
        let extra_fields = match extra {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(WorkflowError::PayloadNotAnObject),
        };

        let now = Utc::now();
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;

        let entity = E::load(&tx, id)?;
        let from = entity.status();

        definition.ensure_allowed(from, target)?;

        if !E::authorize(self.authorizer.as_ref(), actor, &entity, target) {
            return Err(WorkflowError::Unauthorized {
                actor_id: actor.id,
                action: format!(
                    "transition {} {id} to {}",
                    E::ENTITY_TYPE,
                    target.as_str()
                ),
            });
        }

        for guard in definition.guards_for(target) {
            guard(&tx, &entity)?;
        }

        let event_name = definition.event_name(target)?;

        let updated = match entity.persist_status(&tx, target, now) {
            Ok(updated) => updated,
            Err(StoreError::VersionConflict { .. }) => {
                // Lost a race with a concurrent transition; report against
                // the status the entity actually has now.
                let fresh = E::load(&tx, id)?;
                return Err(WorkflowError::InvalidTransition {
                    entity_type: E::ENTITY_TYPE,
                    from: fresh.status().as_str(),
                    to: target.as_str(),
                });
            },
            Err(err) => return Err(err.into()),
        };

        let mut payload = Map::new();
        payload.insert("from_state".to_string(), Value::from(from.as_str()));
        payload.insert("to_state".to_string(), Value::from(target.as_str()));
        for (key, value) in extra_fields {
            payload.entry(key).or_insert(value);
        }

        writer::enqueue(
            &tx,
            &EventDraft::new(E::ENTITY_TYPE, id, event_name)
                .with_actor(*actor)
                .with_payload(Value::Object(payload)),
            now,
        )?;

        tx.commit().map_err(StoreError::from)?;
        debug!(
            entity_type = %E::ENTITY_TYPE,
            entity_id = %id,
            from = from.as_str(),
            to = target.as_str(),
            "transition applied"
        );
        Ok(updated)
    }

    /// Creates a DRAFT opportunity.
    ///
    /// At least one counterpart party (employer or institution) must be
    /// present; they determine whose evidence reviews the placement requires.
    ///
    /// # Errors
    ///
    /// Returns a guard violation if no counterpart is given, or a store or
    /// ledger error.
    pub fn create_opportunity(
        &self,
        actor: &Actor,
        title: impl Into<String>,
        employer_id: Option<Uuid>,
        institution_id: Option<Uuid>,
    ) -> Result<Opportunity, WorkflowError> {
        if employer_id.is_none() && institution_id.is_none() {
            return Err(WorkflowError::guard(
                "opportunity requires at least one counterpart party",
            ));
        }

        let now = Utc::now();
        let opportunity = Opportunity::new(title, employer_id, institution_id, now);

        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;
        sql::insert_opportunity(&tx, &opportunity)?;
        writer::enqueue(
            &tx,
            &EventDraft::new(
                EntityType::Opportunity,
                opportunity.id,
                "opportunity.drafted",
            )
            .with_actor(*actor)
            .with_payload(json!({
                "title": opportunity.title,
                "employer_id": opportunity.employer_id.map(|id| id.to_string()),
                "institution_id": opportunity.institution_id.map(|id| id.to_string()),
            })),
            now,
        )?;
        tx.commit().map_err(StoreError::from)?;

        debug!(opportunity_id = %opportunity.id, "opportunity drafted");
        Ok(opportunity)
    }

    /// Submits an application by the acting student to an opportunity.
    ///
    /// # Errors
    ///
    /// Returns a guard violation unless the opportunity is OPEN.
    pub fn submit_application(
        &self,
        actor: &Actor,
        opportunity_id: Uuid,
    ) -> Result<Application, WorkflowError> {
        let now = Utc::now();
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;

        let opportunity = sql::load_opportunity(&tx, opportunity_id)?;
        if opportunity.status != OpportunityState::Open {
            return Err(WorkflowError::guard(
                "opportunity is not open for applications",
            ));
        }

        let application = Application::new(opportunity_id, actor.id, now);
        sql::insert_application(&tx, &application)?;
        writer::enqueue(
            &tx,
            &EventDraft::new(
                EntityType::Application,
                application.id,
                "application.submitted",
            )
            .with_actor(*actor)
            .with_payload(json!({
                "opportunity_id": opportunity_id.to_string(),
                "student_id": application.student_id.to_string(),
            })),
            now,
        )?;
        tx.commit().map_err(StoreError::from)?;

        debug!(application_id = %application.id, %opportunity_id, "application submitted");
        Ok(application)
    }

    /// Submits an evidence artifact on an active placement.
    ///
    /// # Errors
    ///
    /// Returns a guard violation unless the application is ACTIVE.
    pub fn submit_evidence(
        &self,
        actor: &Actor,
        application_id: Uuid,
        description: impl Into<String>,
    ) -> Result<Evidence, WorkflowError> {
        let now = Utc::now();
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;

        let application = sql::load_application(&tx, application_id)?;
        if application.status != ApplicationState::Active {
            return Err(WorkflowError::guard(
                "evidence may only be submitted on an active placement",
            ));
        }

        let evidence = Evidence::new(application_id, description, now);
        sql::insert_evidence(&tx, &evidence)?;
        writer::enqueue(
            &tx,
            &EventDraft::new(EntityType::Evidence, evidence.id, "evidence.submitted")
                .with_actor(*actor)
                .with_payload(json!({
                    "application_id": application_id.to_string(),
                    "description": evidence.description,
                })),
            now,
        )?;
        tx.commit().map_err(StoreError::from)?;

        debug!(evidence_id = %evidence.id, %application_id, "evidence submitted");
        Ok(evidence)
    }

    /// Records the employer's verdict on an evidence artifact.
    ///
    /// # Errors
    ///
    /// Returns a guard violation if the placement has no employer
    /// counterpart or the review is already settled.
    pub fn record_employer_review(
        &self,
        actor: &Actor,
        evidence_id: Uuid,
        verdict: ReviewVerdict,
    ) -> Result<Evidence, WorkflowError> {
        self.record_review(actor, evidence_id, ReviewParty::Employer, verdict)
    }

    /// Records the institution's verdict on an evidence artifact.
    ///
    /// # Errors
    ///
    /// Returns a guard violation if the placement has no institution
    /// counterpart or the review is already settled.
    pub fn record_institution_review(
        &self,
        actor: &Actor,
        evidence_id: Uuid,
        verdict: ReviewVerdict,
    ) -> Result<Evidence, WorkflowError> {
        self.record_review(actor, evidence_id, ReviewParty::Institution, verdict)
    }

    fn record_review(
        &self,
        actor: &Actor,
        evidence_id: Uuid,
        party: ReviewParty,
        verdict: ReviewVerdict,
    ) -> Result<Evidence, WorkflowError> {
        let now = Utc::now();
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;

        let evidence = sql::load_evidence(&tx, evidence_id)?;
        let application = sql::load_application(&tx, evidence.application_id)?;
        let opportunity = sql::load_opportunity(&tx, application.opportunity_id)?;

        let required = match party {
            ReviewParty::Employer => opportunity.has_employer_party(),
            ReviewParty::Institution => opportunity.has_institution_party(),
        };
        if !required {
            return Err(WorkflowError::guard(match party {
                ReviewParty::Employer => "no employer counterpart on this placement",
                ReviewParty::Institution => "no institution counterpart on this placement",
            }));
        }

        if !evidence.status.is_pending() {
            return Err(WorkflowError::guard("evidence review is already settled"));
        }

        let (employer_review, institution_review) = match party {
            ReviewParty::Employer => (Some(verdict), evidence.institution_review),
            ReviewParty::Institution => (evidence.employer_review, Some(verdict)),
        };
        let status = aggregate_status(
            employer_review,
            institution_review,
            opportunity.has_employer_party(),
            opportunity.has_institution_party(),
        );

        let updated = sql::update_evidence_review(
            &tx,
            &evidence,
            employer_review,
            institution_review,
            status,
            now,
        )?;

        let event_name = match party {
            ReviewParty::Employer => "evidence.employer_reviewed",
            ReviewParty::Institution => "evidence.institution_reviewed",
        };
        writer::enqueue(
            &tx,
            &EventDraft::new(EntityType::Evidence, evidence_id, event_name)
                .with_actor(*actor)
                .with_payload(json!({
                    "application_id": evidence.application_id.to_string(),
                    "verdict": verdict.as_str(),
                    "status": status.as_str(),
                })),
            now,
        )?;
        tx.commit().map_err(StoreError::from)?;

        debug!(
            evidence_id = %evidence_id,
            verdict = verdict.as_str(),
            status = status.as_str(),
            "evidence review recorded"
        );
        Ok(updated)
    }

    /// Records final feedback and a rating on a completed placement.
    ///
    /// # Errors
    ///
    /// Returns a guard violation unless the application is COMPLETED or
    /// CERTIFIED and the rating is within 1–5.
    pub fn record_feedback(
        &self,
        actor: &Actor,
        application_id: Uuid,
        feedback: &str,
        rating: u8,
    ) -> Result<Application, WorkflowError> {
        if !(1..=5).contains(&rating) {
            return Err(WorkflowError::guard("rating must be between 1 and 5"));
        }

        let now = Utc::now();
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;

        let application = sql::load_application(&tx, application_id)?;
        if !matches!(
            application.status,
            ApplicationState::Completed | ApplicationState::Certified
        ) {
            return Err(WorkflowError::guard(
                "feedback requires a completed placement",
            ));
        }

        let updated = sql::update_application_feedback(&tx, &application, feedback, rating, now)?;
        writer::enqueue(
            &tx,
            &EventDraft::new(
                EntityType::Application,
                application_id,
                "application.feedback_recorded",
            )
            .with_actor(*actor)
            .with_payload(json!({ "rating": rating })),
            now,
        )?;
        tx.commit().map_err(StoreError::from)?;

        debug!(application_id = %application_id, rating, "feedback recorded");
        Ok(updated)
    }
}

impl std::fmt::Debug for PlacementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementEngine")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}
