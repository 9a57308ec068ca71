//! Guard conditions evaluated inside transition transactions.

use rusqlite::Connection;

use super::error::WorkflowError;
use crate::store::{Application, sql};

/// Guard for Application → COMPLETED.
///
/// A placement may only complete once its evidence trail is settled: no
/// artifact still awaiting review, and at least one artifact accepted by
/// every required party. The counts are read in the transition's own
/// transaction, so the decision is made against a consistent snapshot.
pub(crate) fn completion_requires_settled_evidence(
    conn: &Connection,
    application: &Application,
) -> Result<(), WorkflowError> {
    let counts = sql::evidence_counts(conn, application.id)?;
    if counts.pending > 0 {
        return Err(WorkflowError::guard("cannot complete with pending evidence"));
    }
    if counts.accepted == 0 {
        return Err(WorkflowError::guard("no accepted evidence"));
    }
    Ok(())
}
