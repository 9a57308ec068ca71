//! Row model for placement entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::{EvidenceStatus, ReviewVerdict};
use crate::workflow::{ApplicationState, OpportunityState};

/// A job posting owned by an employer and/or institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Stable identity.
    pub id: Uuid,

    /// Human-readable title.
    pub title: String,

    /// Employer counterpart, if the placement has one.
    pub employer_id: Option<Uuid>,

    /// Institution counterpart, if the placement has one.
    pub institution_id: Option<Uuid>,

    /// Current lifecycle state.
    pub status: OpportunityState,

    /// Optimistic concurrency counter, bumped on every mutation.
    pub version: i64,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Creates a new DRAFT opportunity.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        employer_id: Option<Uuid>,
        institution_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            employer_id,
            institution_id,
            status: OpportunityState::Draft,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an employer counterpart reviews evidence on this placement.
    #[must_use]
    pub const fn has_employer_party(&self) -> bool {
        self.employer_id.is_some()
    }

    /// Whether an institution counterpart reviews evidence on this placement.
    #[must_use]
    pub const fn has_institution_party(&self) -> bool {
        self.institution_id.is_some()
    }
}

/// A student engagement on an opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Stable identity.
    pub id: Uuid,

    /// The opportunity applied to.
    pub opportunity_id: Uuid,

    /// The applying student.
    pub student_id: Uuid,

    /// Current lifecycle state.
    pub status: ApplicationState,

    /// Optimistic concurrency counter, bumped on every mutation.
    pub version: i64,

    /// Final feedback text, recorded after completion.
    pub feedback: Option<String>,

    /// Final rating (1-5), recorded with the feedback.
    pub rating: Option<u8>,

    /// Submission time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Creates a new APPLIED application.
    #[must_use]
    pub fn new(opportunity_id: Uuid, student_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity_id,
            student_id,
            status: ApplicationState::Applied,
            version: 0,
            feedback: None,
            rating: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An evidence artifact submitted on an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Stable identity.
    pub id: Uuid,

    /// The application this artifact belongs to.
    pub application_id: Uuid,

    /// What the artifact demonstrates.
    pub description: String,

    /// Employer verdict slot.
    pub employer_review: Option<ReviewVerdict>,

    /// Institution verdict slot.
    pub institution_review: Option<ReviewVerdict>,

    /// Aggregate status, always derived from the two slots and the
    /// placement's required parties.
    pub status: EvidenceStatus,

    /// Optimistic concurrency counter, bumped on every mutation.
    pub version: i64,

    /// Submission time.
    pub submitted_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Evidence {
    /// Creates a new SUBMITTED evidence artifact.
    #[must_use]
    pub fn new(application_id: Uuid, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            description: description.into(),
            employer_review: None,
            institution_review: None,
            status: EvidenceStatus::Submitted,
            version: 0,
            submitted_at: now,
            updated_at: now,
        }
    }
}

/// Evidence tallies used by the completion guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceCounts {
    /// Artifacts whose aggregate status is ACCEPTED.
    pub accepted: u64,

    /// Artifacts whose aggregate status still blocks completion
    /// (SUBMITTED, REVIEWED, or REVISION_REQUIRED).
    pub pending: u64,

    /// All artifacts on the application.
    pub total: u64,
}
