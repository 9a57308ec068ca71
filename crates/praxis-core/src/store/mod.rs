//! Entity storage for placements.
//!
//! This module owns the `SQLite` database handle and the row model for
//! Opportunity, Application, and Evidence entities. All mutating operations
//! are version-checked (optimistic concurrency): the entity row is the unit
//! of mutual exclusion, and a lost race surfaces as
//! [`StoreError::VersionConflict`] instead of a silent overwrite.
//!
//! Row access functions take a [`rusqlite::Connection`] reference so the
//! workflow engine can run guard reads and mutations inside one transaction.

mod model;
mod sqlite;


pub use model::{Application, Evidence, EvidenceCounts, Opportunity};
pub use sqlite::{Database, StoreError, sql};
pub(crate) use sqlite::{fmt_ts, parse_ts};
