//! Commit-deferred ledger writer: outbox enqueue and drain.
//!
//! [`LedgerWriter`] records events by enqueuing them on the durable outbox,
//! inside the caller's transaction when one is open, so the enqueue commits
//! or aborts with the business mutation. [`OutboxDrain`] is the single
//! consumer that turns committed outbox rows into hash-chained events.
//!
//! # Ordering
//!
//! The drain processes rows strictly in outbox id order. Rows are enqueued
//! inside their business transactions, and the store serializes writers, so
//! id order is commit order; per-entity chain order follows. When a row is
//! backing off after a failure, every later row for the same entity is held
//! back too, since delivering it early would append out of commit order.
//!
//! # Delivery
//!
//! Each row is delivered in its own transaction: read the chain head, insert
//! the event with `previous_hash` set, compute the digest over the stored
//! fields (the assigned id included), backfill it, and delete the outbox
//! row. A transient failure rolls all of that back and reschedules the row
//! with capped exponential backoff; a success leaves nothing to redeliver.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};

use super::error::LedgerError;
use super::event::{EventDraft, LedgerEvent};
use super::storage::{self, OutboxEntry};
use crate::canonical::canonical_json;
use crate::config::OutboxConfig;
use crate::crypto::EventHasher;
use crate::store::{Database, fmt_ts, parse_ts};

/// Records business events onto the durable outbox.
#[derive(Debug, Clone)]
pub struct LedgerWriter {
    db: Database,
}

impl LedgerWriter {
    /// Creates a writer over the given database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records an event: enqueues it for delivery in its own small
    /// transaction.
    ///
    /// Callers that already hold a transaction (the workflow engine) use
    /// [`enqueue`] instead so the event commits atomically with the
    /// business mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be canonicalized or the
    /// enqueue fails.
    pub fn record_event(&self, draft: &EventDraft) -> Result<(), LedgerError> {
        let conn = self.db.lock();
        enqueue(&conn, draft, Utc::now())?;
        Ok(())
    }
}

/// Enqueues a draft on the outbox over an existing connection/transaction.
///
/// The payload is canonicalized here so malformed payloads fail inside the
/// caller's transaction instead of poisoning the drain.
///
/// # Errors
///
/// Returns an error if the payload cannot be canonicalized or the insert
/// fails.
pub fn enqueue(
    conn: &Connection,
    draft: &EventDraft,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    let payload = canonical_json(&draft.payload)?;
    let actor_id = draft.actor.map(|a| a.id.to_string());
    let actor_role = draft.actor.map(|a| a.role.as_str());
    storage::insert_outbox(
        conn,
        draft.entity_type.as_str(),
        &draft.entity_id.to_string(),
        &draft.event_type,
        actor_id.as_deref(),
        actor_role,
        &payload,
        &fmt_ts(now),
    )
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events appended to the ledger.
    pub appended: u64,

    /// Rows that failed and were rescheduled.
    pub failed: u64,

    /// Rows skipped because they were not due yet, or held back behind an
    /// earlier row for the same entity.
    pub deferred: u64,
}

impl DrainReport {
    /// Whether the pass made no progress and nothing was pending.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.appended == 0 && self.failed == 0 && self.deferred == 0
    }
}

/// Single consumer draining the outbox into the event ledger.
#[derive(Debug, Clone)]
pub struct OutboxDrain {
    db: Database,
    config: OutboxConfig,
}

impl OutboxDrain {
    /// Creates a drain over the given database.
    #[must_use]
    pub const fn new(db: Database, config: OutboxConfig) -> Self {
        Self { db, config }
    }

    /// Processes one batch of due outbox rows.
    ///
    /// # Errors
    ///
    /// Returns an error only on failures of the drain's own bookkeeping;
    /// per-row delivery failures are recorded and retried, not returned.
    pub fn drain_once(&self) -> Result<DrainReport, LedgerError> {
        self.drain_once_at(Utc::now())
    }

    /// [`Self::drain_once`] with an explicit clock, for deterministic tests.
    ///
    /// # Errors
    ///
    /// Returns an error only on failures of the drain's own bookkeeping.
    pub fn drain_once_at(&self, now: DateTime<Utc>) -> Result<DrainReport, LedgerError> {
        let mut conn = self.db.lock();
        let entries = storage::peek_outbox(&conn, self.config.batch_size)?;
        let now_str = fmt_ts(now);

        let mut report = DrainReport::default();
        // Entities with an undelivered earlier row in this pass; later rows
        // for them must wait so the chain extends in commit order.
        let mut held: Vec<(String, String)> = Vec::new();

        for entry in entries {
            let key = (entry.entity_type.clone(), entry.entity_id.clone());
            if held.contains(&key) || !entry.is_due(&now_str) {
                held.push(key);
                report.deferred += 1;
                continue;
            }

            match deliver(&mut conn, &entry, now) {
                Ok(event_id) => {
                    debug!(
                        event_id,
                        entity_type = %entry.entity_type,
                        entity_id = %entry.entity_id,
                        event_type = %entry.event_type,
                        "ledger event appended"
                    );
                    report.appended += 1;
                },
                Err(err) => {
                    let backoff = self.config.backoff_for(entry.attempts);
                    let next_attempt =
                        now + Duration::milliseconds(i64::try_from(backoff).unwrap_or(i64::MAX));
                    warn!(
                        outbox_id = entry.id,
                        attempts = entry.attempts + 1,
                        error = %err,
                        "ledger append failed, retrying"
                    );
                    storage::record_outbox_failure(
                        &conn,
                        entry.id,
                        &fmt_ts(next_attempt),
                        &err.to_string(),
                    )?;
                    held.push(key);
                    report.failed += 1;
                },
            }
        }

        Ok(report)
    }

    /// Drains until no row is appended or failed anymore.
    ///
    /// Deferred rows may remain (backing off, or held behind one). Returns
    /// the total number of appended events.
    ///
    /// # Errors
    ///
    /// Returns an error on bookkeeping failures, as [`Self::drain_once`].
    pub fn drain_until_idle(&self) -> Result<u64, LedgerError> {
        let mut appended = 0;
        loop {
            let report = self.drain_once()?;
            appended += report.appended;
            if report.appended == 0 {
                return Ok(appended);
            }
        }
    }
}

/// Delivers one outbox row in its own transaction.
fn deliver(
    conn: &mut Connection,
    entry: &OutboxEntry,
    now: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    let tx = conn.transaction()?;

    let head = storage::latest_event(&tx, &entry.entity_type, &entry.entity_id)?;
    let (previous_hash, floor) = match head {
        Some(head_event) => {
            let hash = head_event
                .hash
                .ok_or(LedgerError::UnhashedChainHead { id: head_event.id })?;
            let floor = parse_ts(&head_event.occurred_at).ok();
            (Some(hash), floor)
        },
        None => (None, None),
    };

    // occurred_at is monotonic per chain even across clock regressions.
    let occurred_at = fmt_ts(floor.map_or(now, |f| now.max(f)));

    let id = storage::insert_event(&tx, entry, &occurred_at, previous_hash.as_ref())?;

    let event = LedgerEvent {
        id,
        entity_type: entry.entity_type.clone(),
        entity_id: entry.entity_id.clone(),
        event_type: entry.event_type.clone(),
        actor_id: entry.actor_id.clone(),
        actor_role: entry.actor_role.clone(),
        payload: entry.payload.clone(),
        occurred_at,
        previous_hash,
        hash: None,
    };
    let hash = EventHasher::digest(&event.hash_preimage());

    storage::backfill_hash(&tx, id, &hash)?;
    storage::delete_outbox(&tx, entry.id)?;

    tx.commit()?;
    Ok(id)
}
