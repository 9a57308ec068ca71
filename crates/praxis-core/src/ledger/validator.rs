//! Offline chain validation.
//!
//! The validator replays an entity's chain and recomputes every digest from
//! the stored fields. It is read-only and safe to run concurrently with
//! writes; a chain read mid-delivery can report a transient false negative,
//! which resolves on the next run (eventual consistency). Corruption is
//! reported, never repaired.

use serde::Serialize;

use super::error::LedgerError;
use super::event::EntityType;
use super::storage;
use crate::crypto::EventHasher;
use crate::store::Database;

/// Verification result for a single event.
#[derive(Debug, Clone, Serialize)]
pub struct ChainEntryReport {
    /// The event id.
    pub event_id: i64,

    /// The business event name, for report readability.
    pub event_type: String,

    /// Whether the stored hash equals the digest recomputed from the stored
    /// fields.
    pub hash_valid: bool,

    /// Whether the stored `previous_hash` equals the predecessor's stored
    /// hash (genesis: whether it is absent).
    pub link_valid: bool,
}

/// Verification result for an entity's whole chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    /// Entity type tag of the chain.
    pub entity_type: String,

    /// Entity id of the chain.
    pub entity_id: String,

    /// AND of every per-event check.
    pub is_valid: bool,

    /// Number of events replayed.
    pub event_count: u64,

    /// Per-event results in replay order.
    pub entries: Vec<ChainEntryReport>,
}

/// Replays ledger chains and verifies their integrity.
#[derive(Debug, Clone)]
pub struct ChainValidator {
    db: Database,
}

impl ChainValidator {
    /// Creates a validator over the given database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validates the chain for one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be read; verification findings
    /// are reported in the [`ChainReport`], not as errors.
    pub fn validate_chain(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<ChainReport, LedgerError> {
        let events = {
            let conn = self.db.lock();
            storage::read_chain(&conn, entity_type.as_str(), entity_id)?
        };

        let mut entries = Vec::with_capacity(events.len());
        let mut is_valid = true;
        let mut expected_prev = None;

        for event in &events {
            let computed = EventHasher::digest(&event.hash_preimage());
            let hash_valid = event
                .hash
                .as_ref()
                .map_or(false, |stored| EventHasher::matches(&computed, stored));

            let link_valid = match (&event.previous_hash, &expected_prev) {
                (None, None) => true,
                (Some(stored), Some(prev)) => EventHasher::matches(stored, prev),
                _ => false,
            };

            is_valid &= hash_valid && link_valid;
            entries.push(ChainEntryReport {
                event_id: event.id,
                event_type: event.event_type.clone(),
                hash_valid,
                link_valid,
            });

            // The link check chains on stored hashes: a single corrupted
            // event shows up as its own hash mismatch plus one broken link,
            // not as a cascade over the rest of the chain.
            expected_prev = event.hash;
        }

        Ok(ChainReport {
            entity_type: entity_type.as_str().to_string(),
            entity_id: entity_id.to_string(),
            is_valid,
            event_count: entries.len() as u64,
            entries,
        })
    }
}
