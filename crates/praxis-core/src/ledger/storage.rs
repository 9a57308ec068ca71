//! Row access for the ledger and its outbox.
//!
//! Functions take a [`rusqlite::Connection`] reference so the writer can
//! compose the append, the hash backfill, and the outbox-row delete inside
//! one transaction, and the workflow engine can enqueue inside its own.

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use super::error::LedgerError;
use super::event::LedgerEvent;
use crate::crypto::{Hash, hash_from_slice};
use crate::store::Database;

/// A pending row on the writer outbox.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Outbox row id; enqueue (and therefore commit) order.
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

    /// When the row was enqueued.
    pub enqueued_at: String,

    /// Delivery attempts so far.
    pub attempts: u32,

    /// Earliest next delivery attempt; `None` means due immediately.
    pub next_attempt_at: Option<String>,

    /// Failure message from the last attempt, if any.
    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Whether the entry is due for delivery at `now` (stored timestamp
    /// format, so string comparison is time comparison).
    #[must_use]
    pub fn is_due(&self, now: &str) -> bool {
        self.next_attempt_at.as_deref().map_or(true, |at| at <= now)
    }
}

/// Ledger-wide statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    /// Total number of stored events.
    pub event_count: u64,

    /// Events per entity type.
    pub events_by_entity_type: Vec<(String, u64)>,

    /// Highest event id (0 if empty).
    pub head_event_id: u64,

    /// Pending outbox rows.
    pub outbox_depth: u64,

    /// Outbox rows that have failed at least once and await retry.
    pub outbox_retrying: u64,
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<LedgerEvent> {
    let previous_hash: Option<Vec<u8>> = row.get(8)?;
    let hash: Option<Vec<u8>> = row.get(9)?;
    Ok(LedgerEvent {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        event_type: row.get(3)?,
        actor_id: row.get(4)?,
        actor_role: row.get(5)?,
        payload: row.get(6)?,
        occurred_at: row.get(7)?,
        previous_hash: previous_hash.as_deref().and_then(hash_from_slice),
        hash: hash.as_deref().and_then(hash_from_slice),
    })
}

const EVENT_COLUMNS: &str = "id, entity_type, entity_id, event_type, actor_id, actor_role, payload, occurred_at, previous_hash, hash";

/// Returns the most recent event on an entity's chain, if any.
pub fn latest_event(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Option<LedgerEvent>, LedgerError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM ledger_events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY occurred_at DESC, id DESC
         LIMIT 1"
    );
    let event = conn
        .query_row(&sql, params![entity_type, entity_id], map_event)
        .optional()?;
    Ok(event)
}

/// Reads an entity's full chain in replay order.
pub fn read_chain(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM ledger_events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY occurred_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(params![entity_type, entity_id], map_event)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Inserts an event row (hash still unset) and returns its assigned id.
pub fn insert_event(
    conn: &Connection,
    entry: &OutboxEntry,
    occurred_at: &str,
    previous_hash: Option<&Hash>,
) -> Result<i64, LedgerError> {
    conn.execute(
        "INSERT INTO ledger_events (entity_type, entity_id, event_type, actor_id, actor_role, payload, occurred_at, previous_hash, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
        params![
            entry.entity_type,
            entry.entity_id,
            entry.event_type,
            entry.actor_id,
            entry.actor_role,
            entry.payload,
            occurred_at,
            previous_hash.map(|h| h.to_vec()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Backfills the computed hash onto a freshly inserted event.
///
/// # Errors
///
/// Returns `LedgerError::AppendOnlyViolation` if the event already has a
/// hash; stored events are never rewritten.
pub fn backfill_hash(conn: &Connection, id: i64, hash: &Hash) -> Result<(), LedgerError> {
    let changed = conn.execute(
        "UPDATE ledger_events SET hash = ?1 WHERE id = ?2 AND hash IS NULL",
        params![hash.to_vec(), id],
    )?;
    if changed == 0 {
        return Err(LedgerError::AppendOnlyViolation { id });
    }
    Ok(())
}

/// Enqueues a prepared outbox row; returns its id.
pub fn insert_outbox(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    event_type: &str,
    actor_id: Option<&str>,
    actor_role: Option<&str>,
    payload: &str,
    enqueued_at: &str,
) -> Result<i64, LedgerError> {
    conn.execute(
        "INSERT INTO ledger_outbox (entity_type, entity_id, event_type, actor_id, actor_role, payload, enqueued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entity_type,
            entity_id,
            event_type,
            actor_id,
            actor_role,
            payload,
            enqueued_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Reads the oldest outbox rows in enqueue order, due or not.
///
/// The drain needs the not-yet-due rows too: a due row must not be delivered
/// while an earlier row for the same entity is still backing off, or the
/// chain would be appended out of commit order.
pub fn peek_outbox(conn: &Connection, limit: u32) -> Result<Vec<OutboxEntry>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor_id, actor_role, payload, enqueued_at, attempts, next_attempt_at, last_error
         FROM ledger_outbox
         ORDER BY id ASC
         LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit], |row| {
            Ok(OutboxEntry {
                id: row.get(0)?,
                entity_type: row.get(1)?,
                entity_id: row.get(2)?,
                event_type: row.get(3)?,
                actor_id: row.get(4)?,
                actor_role: row.get(5)?,
                payload: row.get(6)?,
                enqueued_at: row.get(7)?,
                attempts: row.get(8)?,
                next_attempt_at: row.get(9)?,
                last_error: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Deletes a delivered outbox row.
pub fn delete_outbox(conn: &Connection, id: i64) -> Result<(), LedgerError> {
    conn.execute("DELETE FROM ledger_outbox WHERE id = ?1", params![id])?;
    Ok(())
}

/// Records a failed delivery attempt and schedules the retry.
pub fn record_outbox_failure(
    conn: &Connection,
    id: i64,
    next_attempt_at: &str,
    error: &str,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE ledger_outbox SET attempts = attempts + 1, next_attempt_at = ?1, last_error = ?2
         WHERE id = ?3",
        params![next_attempt_at, error, id],
    )?;
    Ok(())
}

/// Reads an entity's full chain in replay order, over the database handle.
///
/// Public read surface for callers outside a transaction (audit tooling,
/// service layers); the connection-level [`read_chain`] backs it.
pub fn chain(
    db: &Database,
    entity_type: super::event::EntityType,
    entity_id: Uuid,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let conn = db.lock();
    read_chain(&conn, entity_type.as_str(), &entity_id.to_string())
}

/// Gathers ledger-wide statistics.
pub fn stats(db: &Database) -> Result<LedgerStats, LedgerError> {
    let conn = db.lock();

    let event_count: i64 = conn.query_row("SELECT COUNT(*) FROM ledger_events", [], |row| {
        row.get(0)
    })?;
    let head_event_id: Option<i64> =
        conn.query_row("SELECT MAX(id) FROM ledger_events", [], |row| row.get(0))?;
    let outbox_depth: i64 =
        conn.query_row("SELECT COUNT(*) FROM ledger_outbox", [], |row| row.get(0))?;
    let outbox_retrying: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ledger_outbox WHERE attempts > 0",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT entity_type, COUNT(*) FROM ledger_events GROUP BY entity_type ORDER BY entity_type",
    )?;
    let events_by_entity_type = stmt
        .query_map([], |row| {
            let entity_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((entity_type, u64::try_from(count).unwrap_or(0)))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LedgerStats {
        event_count: u64::try_from(event_count).unwrap_or(0),
        events_by_entity_type,
        head_event_id: head_event_id.and_then(|id| u64::try_from(id).ok()).unwrap_or(0),
        outbox_depth: u64::try_from(outbox_depth).unwrap_or(0),
        outbox_retrying: u64::try_from(outbox_retrying).unwrap_or(0),
    })
}
