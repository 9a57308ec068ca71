//! Lifecycle states for Opportunity and Application entities.

use serde::{Deserialize, Serialize};

use super::error::WorkflowError;

/// Common surface of a workflow state enum.
///
/// Implemented by [`OpportunityState`] and [`ApplicationState`]; the
/// transition tables and the engine are generic over it.
pub trait WorkflowState:
    Copy + Eq + std::fmt::Debug + std::fmt::Display + Send + Sync + 'static
{
    /// Returns the canonical string representation of this state.
    fn as_str(self) -> &'static str;

    /// Parses a state from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::InvalidState` if the string is not a
    /// recognized state.
    fn parse(s: &str) -> Result<Self, WorkflowError>;
}

/// Lifecycle state of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityState {
    /// Being drafted, not visible to students.
    Draft,

    /// Open for applications.
    Open,

    /// Closed to new applications; may be re-opened.
    Closed,
}

impl WorkflowState for OpportunityState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    fn parse(s: &str) -> Result<Self, WorkflowError> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(WorkflowError::InvalidState {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OpportunityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a student engagement on an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    /// Submitted by the student.
    Applied,

    /// Shortlisted by the employer.
    Shortlisted,

    /// Offer accepted; placement not yet started.
    Accepted,

    /// Placement in progress.
    Active,

    /// Placement finished with accepted evidence.
    Completed,

    /// Certified by the institution. Terminal.
    Certified,

    /// Turned down. Terminal.
    Rejected,

    /// Ended prematurely by either side. Terminal.
    Terminated,
}

impl WorkflowState for ApplicationState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "APPLIED",
            Self::Shortlisted => "SHORTLISTED",
            Self::Accepted => "ACCEPTED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Certified => "CERTIFIED",
            Self::Rejected => "REJECTED",
            Self::Terminated => "TERMINATED",
        }
    }

    fn parse(s: &str) -> Result<Self, WorkflowError> {
        match s.to_uppercase().as_str() {
            "APPLIED" => Ok(Self::Applied),
            "SHORTLISTED" => Ok(Self::Shortlisted),
            "ACCEPTED" => Ok(Self::Accepted),
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "CERTIFIED" => Ok(Self::Certified),
            "REJECTED" => Ok(Self::Rejected),
            "TERMINATED" => Ok(Self::Terminated),
            _ => Err(WorkflowError::InvalidState {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
