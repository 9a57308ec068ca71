//! Tests for the ledger: chain construction, outbox semantics, validation.

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::event::{EntityType, EventDraft};
use super::storage;
use super::validator::ChainValidator;
use super::writer::{LedgerWriter, OutboxDrain};
use crate::actor::{Actor, ActorRole};
use crate::config::OutboxConfig;
use crate::store::Database;

fn database() -> Database {
    Database::in_memory().unwrap()
}

fn drain(db: &Database) -> OutboxDrain {
    OutboxDrain::new(db.clone(), OutboxConfig::default())
}

fn sample_draft(entity_id: Uuid, event_type: &str) -> EventDraft {
    EventDraft::new(EntityType::Application, entity_id, event_type)
        .with_actor(Actor::new(Uuid::new_v4(), ActorRole::Employer))
        .with_payload(json!({"from_state": "APPLIED", "to_state": "SHORTLISTED"}))
}

/// Breaks delivery by hiding the events table; `restore` undoes it.
fn sabotage(db: &Database) {
    db.lock()
        .execute_batch("ALTER TABLE ledger_events RENAME TO ledger_events_hidden")
        .unwrap();
}

fn restore(db: &Database) {
    db.lock()
        .execute_batch("ALTER TABLE ledger_events_hidden RENAME TO ledger_events")
        .unwrap();
}

#[test]
fn test_chain_genesis_and_links() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();

    for event_type in [
        "application.submitted",
        "application.shortlisted",
        "application.accepted",
    ] {
        writer.record_event(&sample_draft(entity_id, event_type)).unwrap();
    }
    assert_eq!(drain(&db).drain_until_idle().unwrap(), 3);

    let conn = db.lock();
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    assert_eq!(chain.len(), 3);

    assert!(chain[0].previous_hash.is_none());
    assert_eq!(chain[1].previous_hash, chain[0].hash);
    assert_eq!(chain[2].previous_hash, chain[1].hash);
    assert!(chain.iter().all(|event| event.hash.is_some()));
    assert_eq!(chain[0].event_type, "application.submitted");
    assert_eq!(chain[2].event_type, "application.accepted");
}

#[test]
fn test_chains_are_per_entity() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    // Interleaved enqueues; each entity still gets its own genesis.
    writer.record_event(&sample_draft(first, "application.submitted")).unwrap();
    writer.record_event(&sample_draft(second, "application.submitted")).unwrap();
    writer.record_event(&sample_draft(first, "application.shortlisted")).unwrap();
    assert_eq!(drain(&db).drain_until_idle().unwrap(), 3);

    let conn = db.lock();
    let first_chain = storage::read_chain(&conn, "application", &first.to_string()).unwrap();
    let second_chain = storage::read_chain(&conn, "application", &second.to_string()).unwrap();

    assert_eq!(first_chain.len(), 2);
    assert_eq!(second_chain.len(), 1);
    assert!(first_chain[0].previous_hash.is_none());
    assert!(second_chain[0].previous_hash.is_none());
    assert_eq!(first_chain[1].previous_hash, first_chain[0].hash);
}

#[test]
fn test_aborted_transaction_enqueues_nothing() {
    let db = database();
    let entity_id = Uuid::new_v4();

    {
        let mut conn = db.lock();
        let tx = conn.transaction().unwrap();
        super::writer::enqueue(
            &tx,
            &sample_draft(entity_id, "application.submitted"),
            Utc::now(),
        )
        .unwrap();
        // Dropped without commit: the enqueue must vanish with the abort.
    }

    assert_eq!(drain(&db).drain_until_idle().unwrap(), 0);
    let conn = db.lock();
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    assert!(chain.is_empty());
}

#[test]
fn test_drain_is_exactly_once() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();

    writer.record_event(&sample_draft(entity_id, "application.submitted")).unwrap();

    let outbox_drain = drain(&db);
    assert_eq!(outbox_drain.drain_until_idle().unwrap(), 1);
    assert_eq!(outbox_drain.drain_until_idle().unwrap(), 0);

    let conn = db.lock();
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_failed_delivery_is_recorded_and_retried() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();
    let outbox_drain = drain(&db);

    writer.record_event(&sample_draft(entity_id, "application.submitted")).unwrap();

    sabotage(&db);
    let now = Utc::now();
    let report = outbox_drain.drain_once_at(now).unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(report.failed, 1);

    {
        let conn = db.lock();
        let pending = storage::peek_outbox(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());
        assert!(pending[0].next_attempt_at.is_some());
    }

    restore(&db);

    // Still backing off: nothing due yet.
    let report = outbox_drain.drain_once_at(now).unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(report.deferred, 1);

    // Past the backoff the row delivers, and the bookkeeping is gone.
    let report = outbox_drain.drain_once_at(now + Duration::seconds(5)).unwrap();
    assert_eq!(report.appended, 1);

    let conn = db.lock();
    assert!(storage::peek_outbox(&conn, 10).unwrap().is_empty());
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_backing_off_row_holds_back_same_entity() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();
    let outbox_drain = drain(&db);

    writer.record_event(&sample_draft(entity_id, "application.submitted")).unwrap();

    sabotage(&db);
    let now = Utc::now();
    assert_eq!(outbox_drain.drain_once_at(now).unwrap().failed, 1);
    restore(&db);

    // A second event for the same entity is due immediately, but must wait
    // behind the backing-off first row to preserve commit order.
    writer.record_event(&sample_draft(entity_id, "application.shortlisted")).unwrap();

    let report = outbox_drain.drain_once_at(now).unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(report.deferred, 2);

    let report = outbox_drain.drain_once_at(now + Duration::seconds(5)).unwrap();
    assert_eq!(report.appended, 2);

    let conn = db.lock();
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    assert_eq!(chain[0].event_type, "application.submitted");
    assert_eq!(chain[1].event_type, "application.shortlisted");
    assert_eq!(chain[1].previous_hash, chain[0].hash);
}

#[test]
fn test_occurred_at_monotonic_across_clock_regression() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();
    let outbox_drain = drain(&db);

    writer.record_event(&sample_draft(entity_id, "application.submitted")).unwrap();
    let first_pass = Utc::now();
    assert_eq!(outbox_drain.drain_once_at(first_pass).unwrap().appended, 1);

    // The clock jumps backwards before the second delivery.
    writer.record_event(&sample_draft(entity_id, "application.shortlisted")).unwrap();
    let regressed = first_pass - Duration::hours(1);
    assert_eq!(outbox_drain.drain_once_at(regressed).unwrap().appended, 1);

    let conn = db.lock();
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    assert_eq!(chain.len(), 2);
    assert!(chain[1].occurred_at >= chain[0].occurred_at);
    assert_eq!(chain[1].previous_hash, chain[0].hash);
}

#[test]
fn test_validator_accepts_intact_chain() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();

    for event_type in ["application.submitted", "application.shortlisted"] {
        writer.record_event(&sample_draft(entity_id, event_type)).unwrap();
    }
    drain(&db).drain_until_idle().unwrap();

    let report = ChainValidator::new(db)
        .validate_chain(EntityType::Application, &entity_id.to_string())
        .unwrap();
    assert!(report.is_valid);
    assert_eq!(report.event_count, 2);
    assert!(report.entries.iter().all(|e| e.hash_valid && e.link_valid));
}

#[test]
fn test_validator_on_empty_chain() {
    let db = database();
    let report = ChainValidator::new(db)
        .validate_chain(EntityType::Application, &Uuid::new_v4().to_string())
        .unwrap();
    assert!(report.is_valid);
    assert_eq!(report.event_count, 0);
}

#[test]
fn test_validator_detects_payload_tampering() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();

    for event_type in [
        "application.submitted",
        "application.shortlisted",
        "application.accepted",
    ] {
        writer.record_event(&sample_draft(entity_id, event_type)).unwrap();
    }
    drain(&db).drain_until_idle().unwrap();

    // Retroactively edit the middle event's payload.
    {
        let conn = db.lock();
        let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
        conn.execute(
            "UPDATE ledger_events SET payload = ?1 WHERE id = ?2",
            rusqlite::params![r#"{"from_state":"APPLIED","to_state":"REJECTED"}"#, chain[1].id],
        )
        .unwrap();
    }

    let report = ChainValidator::new(db)
        .validate_chain(EntityType::Application, &entity_id.to_string())
        .unwrap();
    assert!(!report.is_valid);
    assert!(report.entries[0].hash_valid);
    assert!(!report.entries[1].hash_valid);
    // The edit does not break the stored links around it: only the digest
    // gives it away.
    assert!(report.entries[1].link_valid);
    assert!(report.entries[2].hash_valid);
    assert!(report.entries[2].link_valid);
}

#[test]
fn test_validator_detects_hash_rewrite() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();

    for event_type in ["application.submitted", "application.shortlisted"] {
        writer.record_event(&sample_draft(entity_id, event_type)).unwrap();
    }
    drain(&db).drain_until_idle().unwrap();

    // Overwrite the first event's stored hash.
    {
        let conn = db.lock();
        let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
        conn.execute(
            "UPDATE ledger_events SET hash = ?1 WHERE id = ?2",
            rusqlite::params![vec![0u8; 32], chain[0].id],
        )
        .unwrap();
    }

    let report = ChainValidator::new(db)
        .validate_chain(EntityType::Application, &entity_id.to_string())
        .unwrap();
    assert!(!report.is_valid);
    assert!(!report.entries[0].hash_valid);
    // The successor still points at the original digest, so its link breaks
    // against the rewritten head.
    assert!(!report.entries[1].link_valid);
    assert!(report.entries[1].hash_valid);
}

#[test]
fn test_backfill_is_append_only() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());
    let entity_id = Uuid::new_v4();

    writer.record_event(&sample_draft(entity_id, "application.submitted")).unwrap();
    drain(&db).drain_until_idle().unwrap();

    let conn = db.lock();
    let chain = storage::read_chain(&conn, "application", &entity_id.to_string()).unwrap();
    let err = storage::backfill_hash(&conn, chain[0].id, &[7u8; 32]).unwrap_err();
    assert!(matches!(
        err,
        super::error::LedgerError::AppendOnlyViolation { .. }
    ));
}

#[test]
fn test_stats() {
    let db = database();
    let writer = LedgerWriter::new(db.clone());

    writer
        .record_event(&sample_draft(Uuid::new_v4(), "application.submitted"))
        .unwrap();
    writer
        .record_event(
            &EventDraft::new(EntityType::Opportunity, Uuid::new_v4(), "opportunity.drafted")
                .with_payload(json!({"title": "t"})),
        )
        .unwrap();

    // One pending, one delivered.
    let stats = storage::stats(&db).unwrap();
    assert_eq!(stats.outbox_depth, 2);
    assert_eq!(stats.event_count, 0);

    drain(&db).drain_until_idle().unwrap();

    let stats = storage::stats(&db).unwrap();
    assert_eq!(stats.event_count, 2);
    assert_eq!(stats.outbox_depth, 0);
    assert_eq!(stats.events_by_entity_type.len(), 2);
    assert!(stats.head_event_id >= 2);
}
