//! Append-only transition history.
//!
//! Entries are only ever written together with the state change they
//! describe (see `SqliteResultStore::commit_change`), so the log never holds
//! a transition that did not happen.

use super::error::{WorkflowError, WorkflowResult};
use super::models::{ResultId, TransitionRecord, WorkflowState};
use crate::user::UserRole;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub trait AuditLog: Send + Sync {
    /// Appends `record` and returns it with its assigned sequence number.
    /// The record must refer to an existing result.
    fn append(&self, record: TransitionRecord) -> WorkflowResult<TransitionRecord>;

    /// All transitions of a result, oldest first.
    fn history(&self, result_id: &ResultId) -> WorkflowResult<Vec<TransitionRecord>>;
}

fn invalid_column(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("Unexpected value '{}'", value).into(),
    )
}

pub(super) fn parse_state(index: usize, value: String) -> rusqlite::Result<WorkflowState> {
    WorkflowState::from_db_str(&value).ok_or_else(|| invalid_column(index, &value))
}

fn transition_from_row(row: &Row) -> rusqlite::Result<TransitionRecord> {
    let role_name: String = row.get(5)?;
    let actor_role = UserRole::from_str(&role_name).ok_or_else(|| invalid_column(5, &role_name))?;
    Ok(TransitionRecord {
        sequence: row.get(0)?,
        result_id: ResultId(row.get(1)?),
        from_state: parse_state(2, row.get(2)?)?,
        to_state: parse_state(3, row.get(3)?)?,
        actor_id: row.get(4)?,
        actor_role,
        revision: row.get::<_, i64>(6)? as u64,
        timestamp: row.get(7)?,
        comment: row.get(8)?,
    })
}

pub(super) fn insert_transition(
    conn: &Connection,
    record: TransitionRecord,
) -> WorkflowResult<TransitionRecord> {
    conn.execute(
        "INSERT INTO result_transition (result_id, from_state, to_state, actor_id, actor_role, revision, timestamp, comment)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.result_id.0,
            record.from_state.as_db_str(),
            record.to_state.as_db_str(),
            record.actor_id,
            record.actor_role.as_str(),
            record.revision as i64,
            record.timestamp,
            record.comment,
        ],
    )?;
    Ok(TransitionRecord {
        sequence: conn.last_insert_rowid(),
        ..record
    })
}

pub(super) fn load_history(
    conn: &Connection,
    result_id: &ResultId,
) -> WorkflowResult<Vec<TransitionRecord>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM result WHERE id = ?1",
            params![result_id.0],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Err(WorkflowError::NotFound(result_id.clone()));
    }

    let mut stmt = conn.prepare(
        "SELECT seq, result_id, from_state, to_state, actor_id, actor_role, revision, timestamp, comment
         FROM result_transition WHERE result_id = ?1 ORDER BY seq ASC",
    )?;
    let records = stmt
        .query_map(params![result_id.0], transition_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}
