//! `SQLite`-backed entity store.
//!
//! The [`Database`] handle wraps one connection behind a mutex; WAL mode
//! allows concurrent readers while a write is in progress. Row access lives
//! in the [`sql`] module as free functions over a [`Connection`] so callers
//! can compose them inside a single transaction.

// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use uuid::Uuid;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Errors that can occur during entity store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind.
        entity: &'static str,
        /// The id that was not found.
        id: Uuid,
    },

    /// Version-checked update lost a race with a concurrent mutation.
    #[error("stale version for {entity} {id}: row changed concurrently")]
    VersionConflict {
        /// The entity kind.
        entity: &'static str,
        /// The id whose update was rejected.
        id: Uuid,
    },
}

/// Handle to the placement database.
///
/// Cloning is cheap; clones share the underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens or creates a database at the specified path.
    ///
    /// The schema is applied idempotently and WAL mode is enabled for
    /// concurrent reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the backing file, if not in-memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Locks the shared connection.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Formats a timestamp the way the store persists it: RFC 3339 UTC with
/// nanosecond precision. Fixed width, so string order equals time order and
/// reads round-trip the clock exactly.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a stored timestamp.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Row access over a live connection.
///
/// Every function takes `&Connection` so the workflow engine can run guard
/// reads, version-checked mutations, and outbox enqueues inside one
/// transaction ([`rusqlite::Transaction`] derefs to [`Connection`]).
pub mod sql {
    use rusqlite::{OptionalExtension, Row, params};

    use super::{Connection, DateTime, StoreError, Utc, Uuid, fmt_ts, parse_ts};
    use crate::evidence::{EvidenceStatus, ReviewVerdict};
    use crate::store::model::{Application, Evidence, EvidenceCounts, Opportunity};
    use crate::workflow::{ApplicationState, OpportunityState, WorkflowState};

    fn column_err(
        idx: usize,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    }

    fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
        let raw: String = row.get(idx)?;
        Uuid::parse_str(&raw).map_err(|e| column_err(idx, e))
    }

    fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
        let raw: Option<String> = row.get(idx)?;
        raw.map(|s| Uuid::parse_str(&s).map_err(|e| column_err(idx, e)))
            .transpose()
    }

    fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(idx)?;
        parse_ts(&raw).map_err(|e| column_err(idx, e))
    }

    fn map_opportunity(row: &Row<'_>) -> rusqlite::Result<Opportunity> {
        let status_raw: String = row.get(4)?;
        Ok(Opportunity {
            id: get_uuid(row, 0)?,
            title: row.get(1)?,
            employer_id: get_opt_uuid(row, 2)?,
            institution_id: get_opt_uuid(row, 3)?,
            status: OpportunityState::parse(&status_raw).map_err(|e| column_err(4, e))?,
            version: row.get(5)?,
            created_at: get_ts(row, 6)?,
            updated_at: get_ts(row, 7)?,
        })
    }

    fn map_application(row: &Row<'_>) -> rusqlite::Result<Application> {
        let status_raw: String = row.get(3)?;
        let rating: Option<i64> = row.get(6)?;
        Ok(Application {
            id: get_uuid(row, 0)?,
            opportunity_id: get_uuid(row, 1)?,
            student_id: get_uuid(row, 2)?,
            status: ApplicationState::parse(&status_raw).map_err(|e| column_err(3, e))?,
            version: row.get(4)?,
            feedback: row.get(5)?,
            rating: rating
                .map(|r| u8::try_from(r).map_err(|e| column_err(6, e)))
                .transpose()?,
            created_at: get_ts(row, 7)?,
            updated_at: get_ts(row, 8)?,
        })
    }

    fn map_evidence(row: &Row<'_>) -> rusqlite::Result<Evidence> {
        let employer_raw: Option<String> = row.get(3)?;
        let institution_raw: Option<String> = row.get(4)?;
        let status_raw: String = row.get(5)?;
        Ok(Evidence {
            id: get_uuid(row, 0)?,
            application_id: get_uuid(row, 1)?,
            description: row.get(2)?,
            employer_review: employer_raw
                .map(|s| ReviewVerdict::parse(&s).map_err(|e| column_err(3, e)))
                .transpose()?,
            institution_review: institution_raw
                .map(|s| ReviewVerdict::parse(&s).map_err(|e| column_err(4, e)))
                .transpose()?,
            status: EvidenceStatus::parse(&status_raw).map_err(|e| column_err(5, e))?,
            version: row.get(6)?,
            submitted_at: get_ts(row, 7)?,
            updated_at: get_ts(row, 8)?,
        })
    }

    /// Inserts a new opportunity row.
    pub fn insert_opportunity(conn: &Connection, row: &Opportunity) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO opportunities (id, title, employer_id, institution_id, status, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id.to_string(),
                row.title,
                row.employer_id.map(|id| id.to_string()),
                row.institution_id.map(|id| id.to_string()),
                row.status.as_str(),
                row.version,
                fmt_ts(row.created_at),
                fmt_ts(row.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Loads an opportunity by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no row exists.
    pub fn load_opportunity(conn: &Connection, id: Uuid) -> Result<Opportunity, StoreError> {
        conn.query_row(
            "SELECT id, title, employer_id, institution_id, status, version, created_at, updated_at
             FROM opportunities WHERE id = ?1",
            params![id.to_string()],
            map_opportunity,
        )
        .optional()?
        .ok_or(StoreError::NotFound {
            entity: "opportunity",
            id,
        })
    }

    /// Applies a version-checked status change to an opportunity.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` if the row changed since it was
    /// loaded.
    pub fn update_opportunity_status(
        conn: &Connection,
        row: &Opportunity,
        next: OpportunityState,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, StoreError> {
        let changed = conn.execute(
            "UPDATE opportunities SET status = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4",
            params![next.as_str(), fmt_ts(now), row.id.to_string(), row.version],
        )?;
        if changed == 0 {
            return Err(StoreError::VersionConflict {
                entity: "opportunity",
                id: row.id,
            });
        }
        Ok(Opportunity {
            status: next,
            version: row.version + 1,
            updated_at: now,
            ..row.clone()
        })
    }

    /// Inserts a new application row.
    pub fn insert_application(conn: &Connection, row: &Application) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO applications (id, opportunity_id, student_id, status, version, feedback, rating, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id.to_string(),
                row.opportunity_id.to_string(),
                row.student_id.to_string(),
                row.status.as_str(),
                row.version,
                row.feedback,
                row.rating.map(i64::from),
                fmt_ts(row.created_at),
                fmt_ts(row.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Loads an application by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no row exists.
    pub fn load_application(conn: &Connection, id: Uuid) -> Result<Application, StoreError> {
        conn.query_row(
            "SELECT id, opportunity_id, student_id, status, version, feedback, rating, created_at, updated_at
             FROM applications WHERE id = ?1",
            params![id.to_string()],
            map_application,
        )
        .optional()?
        .ok_or(StoreError::NotFound {
            entity: "application",
            id,
        })
    }

    /// Applies a version-checked status change to an application.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` if the row changed since it was
    /// loaded.
    pub fn update_application_status(
        conn: &Connection,
        row: &Application,
        next: ApplicationState,
        now: DateTime<Utc>,
    ) -> Result<Application, StoreError> {
        let changed = conn.execute(
            "UPDATE applications SET status = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4",
            params![next.as_str(), fmt_ts(now), row.id.to_string(), row.version],
        )?;
        if changed == 0 {
            return Err(StoreError::VersionConflict {
                entity: "application",
                id: row.id,
            });
        }
        Ok(Application {
            status: next,
            version: row.version + 1,
            updated_at: now,
            ..row.clone()
        })
    }

    /// Records final feedback and rating on an application, version-checked.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` if the row changed since it was
    /// loaded.
    pub fn update_application_feedback(
        conn: &Connection,
        row: &Application,
        feedback: &str,
        rating: u8,
        now: DateTime<Utc>,
    ) -> Result<Application, StoreError> {
        let changed = conn.execute(
            "UPDATE applications SET feedback = ?1, rating = ?2, version = version + 1, updated_at = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                feedback,
                i64::from(rating),
                fmt_ts(now),
                row.id.to_string(),
                row.version
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::VersionConflict {
                entity: "application",
                id: row.id,
            });
        }
        Ok(Application {
            feedback: Some(feedback.to_string()),
            rating: Some(rating),
            version: row.version + 1,
            updated_at: now,
            ..row.clone()
        })
    }

    /// Inserts a new evidence row.
    pub fn insert_evidence(conn: &Connection, row: &Evidence) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO evidence (id, application_id, description, employer_review, institution_review, status, version, submitted_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id.to_string(),
                row.application_id.to_string(),
                row.description,
                row.employer_review.map(ReviewVerdict::as_str),
                row.institution_review.map(ReviewVerdict::as_str),
                row.status.as_str(),
                row.version,
                fmt_ts(row.submitted_at),
                fmt_ts(row.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Loads an evidence artifact by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no row exists.
    pub fn load_evidence(conn: &Connection, id: Uuid) -> Result<Evidence, StoreError> {
        conn.query_row(
            "SELECT id, application_id, description, employer_review, institution_review, status, version, submitted_at, updated_at
             FROM evidence WHERE id = ?1",
            params![id.to_string()],
            map_evidence,
        )
        .optional()?
        .ok_or(StoreError::NotFound {
            entity: "evidence",
            id,
        })
    }

    /// Persists updated verdict slots and the recomputed aggregate status,
    /// version-checked.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` if the row changed since it was
    /// loaded.
    pub fn update_evidence_review(
        conn: &Connection,
        row: &Evidence,
        employer_review: Option<ReviewVerdict>,
        institution_review: Option<ReviewVerdict>,
        status: EvidenceStatus,
        now: DateTime<Utc>,
    ) -> Result<Evidence, StoreError> {
        let changed = conn.execute(
            "UPDATE evidence SET employer_review = ?1, institution_review = ?2, status = ?3, version = version + 1, updated_at = ?4
             WHERE id = ?5 AND version = ?6",
            params![
                employer_review.map(ReviewVerdict::as_str),
                institution_review.map(ReviewVerdict::as_str),
                status.as_str(),
                fmt_ts(now),
                row.id.to_string(),
                row.version,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::VersionConflict {
                entity: "evidence",
                id: row.id,
            });
        }
        Ok(Evidence {
            employer_review,
            institution_review,
            status,
            version: row.version + 1,
            updated_at: now,
            ..row.clone()
        })
    }

    /// Lists all evidence on an application in submission order.
    pub fn list_evidence(
        conn: &Connection,
        application_id: Uuid,
    ) -> Result<Vec<Evidence>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, application_id, description, employer_review, institution_review, status, version, submitted_at, updated_at
             FROM evidence WHERE application_id = ?1
             ORDER BY submitted_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![application_id.to_string()], map_evidence)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Tallies evidence statuses for the completion guard.
    pub fn evidence_counts(
        conn: &Connection,
        application_id: Uuid,
    ) -> Result<EvidenceCounts, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM evidence WHERE application_id = ?1 GROUP BY status",
        )?;
        let tallies = stmt
            .query_map(params![application_id.to_string()], |row| {
                let status_raw: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let status =
                    EvidenceStatus::parse(&status_raw).map_err(|e| column_err(0, e))?;
                Ok((status, count))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = EvidenceCounts::default();
        for (status, count) in tallies {
            let count = u64::try_from(count).unwrap_or(0);
            counts.total += count;
            if status == EvidenceStatus::Accepted {
                counts.accepted += count;
            }
            if status.is_pending() {
                counts.pending += count;
            }
        }
        Ok(counts)
    }
}
