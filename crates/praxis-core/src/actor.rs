//! Actor identity and roles.
//!
//! Every workflow operation is performed by an [`Actor`], whose id and role
//! are recorded on the ledger events the operation produces. Authority rules
//! themselves live behind the [`TransitionAuthorizer`] predicate supplied by
//! the access-control layer, not here.
//!
//! [`TransitionAuthorizer`]: crate::workflow::TransitionAuthorizer

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error returned when parsing an unknown role string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid actor role: {value}")]
pub struct InvalidRoleError {
    /// The string that failed to parse.
    pub value: String,
}

/// Role of a participant in a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ActorRole {
    /// The student applying for or working a placement.
    Student,

    /// The employer offering the placement.
    Employer,

    /// A workplace supervisor assigned by the employer.
    Supervisor,

    /// An administrator at the student's institution.
    InstitutionAdmin,

    /// Automated system actions.
    System,
}

impl ActorRole {
    /// Returns the canonical string representation of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Employer => "EMPLOYER",
            Self::Supervisor => "SUPERVISOR",
            Self::InstitutionAdmin => "INSTITUTION_ADMIN",
            Self::System => "SYSTEM",
        }
    }

    /// Parses a role from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRoleError`] if the string is not a recognized role.
    pub fn parse(s: &str) -> Result<Self, InvalidRoleError> {
        match s.to_uppercase().as_str() {
            "STUDENT" => Ok(Self::Student),
            "EMPLOYER" => Ok(Self::Employer),
            "SUPERVISOR" => Ok(Self::Supervisor),
            "INSTITUTION_ADMIN" => Ok(Self::InstitutionAdmin),
            "SYSTEM" => Ok(Self::System),
            _ => Err(InvalidRoleError {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated participant performing a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity of the participant.
    pub id: Uuid,

    /// Role the participant acts under for this operation.
    pub role: ActorRole,
}

impl Actor {
    /// Creates an actor from an id and role.
    #[must_use]
    pub const fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [
            ActorRole::Student,
            ActorRole::Employer,
            ActorRole::Supervisor,
            ActorRole::InstitutionAdmin,
            ActorRole::System,
        ] {
            assert_eq!(ActorRole::parse(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn test_role_parse_lowercase() {
        assert_eq!(
            ActorRole::parse("institution_admin").unwrap(),
            ActorRole::InstitutionAdmin
        );
    }

    #[test]
    fn test_role_parse_unknown_fails() {
        let err = ActorRole::parse("INTERN").unwrap_err();
        assert_eq!(err.value, "INTERN");
    }
}
