//! Event records and drafts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::LedgerError;
use crate::actor::Actor;
use crate::crypto::{Hash, encode_hex};

/// Kind of entity a ledger chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A job posting.
    Opportunity,

    /// A student engagement.
    Application,

    /// An evidence artifact.
    Evidence,
}

impl EntityType {
    /// Returns the canonical string representation of this entity type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opportunity => "opportunity",
            Self::Application => "application",
            Self::Evidence => "evidence",
        }
    }

    /// Parses an entity type from its canonical string form.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidEntityType` if the string is not a
    /// recognized entity type.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s.to_lowercase().as_str() {
            "opportunity" => Ok(Self::Opportunity),
            "application" => Ok(Self::Application),
            "evidence" => Ok(Self::Evidence),
            _ => Err(LedgerError::InvalidEntityType {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business event waiting to be recorded on the ledger.
///
/// Drafts are enqueued on the outbox inside the caller's transaction; the
/// drain turns them into stored [`LedgerEvent`] rows after the commit.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Kind of the entity the event belongs to.
    pub entity_type: EntityType,

    /// Id of the entity the event belongs to.
    pub entity_id: Uuid,

    /// Business event name, e.g. `application.shortlisted`.
    pub event_type: String,

    /// Acting participant, if the event was caused by one.
    pub actor: Option<Actor>,

    /// Structured event payload.
    pub payload: Value,
}

impl EventDraft {
    /// Creates a draft with a null payload and no actor.
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: Uuid, event_type: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id,
            event_type: event_type.into(),
            actor: None,
            payload: Value::Null,
        }
    }

    /// Attributes the draft to an actor (builder pattern).
    #[must_use]
    pub const fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Sets the payload (builder pattern).
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A stored ledger event.
///
/// Textual fields keep the exact bytes the row was written with, so
/// recomputing the hash preimage during validation is byte-exact and immune
/// to parse/format drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unique event id, assigned on insert.
    pub id: i64,

    /// Entity type tag.
    pub entity_type: String,

    /// Entity id.
    pub entity_id: String,

    /// Business event name.
    pub event_type: String,

    /// Acting participant id, if any.
    pub actor_id: Option<String>,

    /// Acting participant role, if any.
    pub actor_role: Option<String>,

    /// Canonical JSON payload text.
    pub payload: String,

    /// Event time, RFC 3339 UTC, non-decreasing per chain.
    pub occurred_at: String,

    /// Hash of the predecessor on this entity's chain; `None` at genesis.
    pub previous_hash: Option<Hash>,

    /// Digest over this event's canonical fields; `None` only between the
    /// insert and the backfill inside the drain's transaction.
    pub hash: Option<Hash>,
}

impl LedgerEvent {
    /// Builds the hash preimage from the stored fields.
    ///
    /// Field order: id, previous hash (hex, empty at genesis), event type,
    /// actor id, actor role, entity id, entity type, canonical payload,
    /// occurrence time.
    #[must_use]
    pub fn hash_preimage(&self) -> Vec<u8> {
        let mut preimage = Vec::new();
        preimage.extend_from_slice(self.id.to_string().as_bytes());
        if let Some(prev) = &self.previous_hash {
            preimage.extend_from_slice(encode_hex(prev).as_bytes());
        }
        preimage.extend_from_slice(self.event_type.as_bytes());
        if let Some(actor_id) = &self.actor_id {
            preimage.extend_from_slice(actor_id.as_bytes());
        }
        if let Some(actor_role) = &self.actor_role {
            preimage.extend_from_slice(actor_role.as_bytes());
        }
        preimage.extend_from_slice(self.entity_id.as_bytes());
        preimage.extend_from_slice(self.entity_type.as_bytes());
        preimage.extend_from_slice(self.payload.as_bytes());
        preimage.extend_from_slice(self.occurred_at.as_bytes());
        preimage
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::actor::ActorRole;

    #[test]
    fn test_entity_type_roundtrip() {
        for entity_type in [
            EntityType::Opportunity,
            EntityType::Application,
            EntityType::Evidence,
        ] {
            assert_eq!(EntityType::parse(entity_type.as_str()).unwrap(), entity_type);
        }
        assert!(matches!(
            EntityType::parse("tenant"),
            Err(LedgerError::InvalidEntityType { .. })
        ));
    }

    #[test]
    fn test_draft_builder() {
        let actor = Actor::new(Uuid::new_v4(), ActorRole::Employer);
        let draft = EventDraft::new(
            EntityType::Application,
            Uuid::new_v4(),
            "application.shortlisted",
        )
        .with_actor(actor)
        .with_payload(serde_json::json!({"rank": 1}));

        assert_eq!(draft.event_type, "application.shortlisted");
        assert_eq!(draft.actor.unwrap().role, ActorRole::Employer);
        assert_eq!(draft.payload["rank"], 1);
    }

    #[test]
    fn test_preimage_depends_on_every_field() {
        let base = LedgerEvent {
            id: 7,
            entity_type: "application".to_string(),
            entity_id: "a-1".to_string(),
            event_type: "application.accepted".to_string(),
            actor_id: Some("actor-1".to_string()),
            actor_role: Some("EMPLOYER".to_string()),
            payload: "{}".to_string(),
            occurred_at: "2026-01-02T03:04:05.000000Z".to_string(),
            previous_hash: Some([3u8; 32]),
            hash: None,
        };

        let reference = base.hash_preimage();

        let variants = [
            LedgerEvent { id: 8, ..base.clone() },
            LedgerEvent {
                previous_hash: Some([4u8; 32]),
                ..base.clone()
            },
            LedgerEvent {
                event_type: "application.rejected".to_string(),
                ..base.clone()
            },
            LedgerEvent {
                actor_id: None,
                ..base.clone()
            },
            LedgerEvent {
                payload: r#"{"k":1}"#.to_string(),
                ..base.clone()
            },
            LedgerEvent {
                occurred_at: "2026-01-02T03:04:05.000001Z".to_string(),
                ..base.clone()
            },
        ];
        for variant in variants {
            assert_ne!(variant.hash_preimage(), reference);
        }
    }
}
