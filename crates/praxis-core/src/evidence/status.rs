//! Review verdicts, aggregate evidence status, and the aggregation rule.

use serde::{Deserialize, Serialize};

use super::error::EvidenceError;

/// Verdict recorded by one reviewing party on an evidence artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    /// The party accepts the evidence.
    Accepted,

    /// The party rejects the evidence.
    Rejected,

    /// The party requires the student to resubmit.
    RevisionRequired,

    /// The party has looked at the evidence without a final decision.
    Reviewed,
}

impl ReviewVerdict {
    /// Returns the canonical string representation of this verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::RevisionRequired => "REVISION_REQUIRED",
            Self::Reviewed => "REVIEWED",
        }
    }

    /// Parses a verdict from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceError::InvalidVerdict` if the string is not a
    /// recognized verdict.
    pub fn parse(s: &str) -> Result<Self, EvidenceError> {
        match s.to_uppercase().as_str() {
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            "REVISION_REQUIRED" => Ok(Self::RevisionRequired),
            "REVIEWED" => Ok(Self::Reviewed),
            _ => Err(EvidenceError::InvalidVerdict {
                value: s.to_string(),
            }),
        }
    }

    /// Returns all verdict values.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Accepted,
            Self::Rejected,
            Self::RevisionRequired,
            Self::Reviewed,
        ]
    }
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of an evidence artifact, derived from both verdict slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStatus {
    /// Submitted, no party has recorded a verdict yet.
    Submitted,

    /// At least one verdict recorded, not yet conclusive.
    Reviewed,

    /// A party requires resubmission.
    RevisionRequired,

    /// Every required party has accepted.
    Accepted,

    /// A party has rejected the evidence.
    Rejected,
}

impl EvidenceStatus {
    /// Returns the canonical string representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Reviewed => "REVIEWED",
            Self::RevisionRequired => "REVISION_REQUIRED",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parses a status from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceError::InvalidStatus` if the string is not a
    /// recognized status.
    pub fn parse(s: &str) -> Result<Self, EvidenceError> {
        match s.to_uppercase().as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            "REVIEWED" => Ok(Self::Reviewed),
            "REVISION_REQUIRED" => Ok(Self::RevisionRequired),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(EvidenceError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }

    /// Whether this status still blocks completion of the owning application.
    ///
    /// Pending evidence is anything a reviewer could still act on; only
    /// ACCEPTED and REJECTED are settled.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Reviewed | Self::RevisionRequired
        )
    }
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combines the two independent party verdicts into one aggregate status.
///
/// Deterministic precedence, evaluated in order:
///
/// 1. Either verdict REJECTED → REJECTED. One objection blocks acceptance
///    regardless of the other party.
/// 2. Either verdict REVISION_REQUIRED → REVISION_REQUIRED.
/// 3. Every *required* party has ACCEPTED → ACCEPTED. A party that is not a
///    counterpart on the placement is not waited for.
/// 4. Any verdict recorded at all → REVIEWED.
/// 5. Otherwise → SUBMITTED.
///
/// Pure function of its inputs; callers persist the result as the evidence
/// row's status.
#[must_use]
pub const fn aggregate_status(
    employer: Option<ReviewVerdict>,
    institution: Option<ReviewVerdict>,
    employer_required: bool,
    institution_required: bool,
) -> EvidenceStatus {
    if matches!(employer, Some(ReviewVerdict::Rejected))
        || matches!(institution, Some(ReviewVerdict::Rejected))
    {
        return EvidenceStatus::Rejected;
    }

    if matches!(employer, Some(ReviewVerdict::RevisionRequired))
        || matches!(institution, Some(ReviewVerdict::RevisionRequired))
    {
        return EvidenceStatus::RevisionRequired;
    }

    let employer_ok = !employer_required || matches!(employer, Some(ReviewVerdict::Accepted));
    let institution_ok =
        !institution_required || matches!(institution, Some(ReviewVerdict::Accepted));
    if employer_ok && institution_ok {
        return EvidenceStatus::Accepted;
    }

    if employer.is_some() || institution.is_some() {
        return EvidenceStatus::Reviewed;
    }

    EvidenceStatus::Submitted
}
