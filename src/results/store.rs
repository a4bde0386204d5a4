use super::audit_log::{insert_transition, load_history, parse_state, AuditLog};
use super::error::{WorkflowError, WorkflowResult};
use super::models::{
    Grade, NewResult, ResultFilter, ResultId, ResultRecord, ScoreRevision, Scores, StateChange,
    TransitionRecord, WorkflowState,
};
use super::schema::RESULTS_VERSIONED_SCHEMAS;
use super::validation::ScoreBounds;
use crate::sqlite_persistence::{open_versioned_db, open_versioned_in_memory};
use anyhow::Context;
use rusqlite::{
    params, params_from_iter, types::Value, Connection, ErrorCode, OpenFlags, OptionalExtension,
    Row, TransactionBehavior,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, error};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;

pub trait ResultStore: AuditLog + Send + Sync {
    /// Stores a new Draft result at revision 0 together with its first score version.
    /// Nothing is written once `deadline` has passed.
    fn create(
        &self,
        new_result: NewResult,
        lecturer_id: usize,
        deadline: Option<Instant>,
    ) -> WorkflowResult<ResultRecord>;

    fn get(&self, id: &ResultId) -> WorkflowResult<ResultRecord>;

    fn list_by_state(
        &self,
        state: WorkflowState,
        filter: &ResultFilter,
    ) -> WorkflowResult<Vec<ResultRecord>>;

    /// Moves the result to `change.to_state` and appends the matching transition
    /// record as one unit. Fails with `StaleState` if the result is no longer at
    /// `change.expected_revision`, and with `StorageUnavailable` without writing
    /// anything once `change.deadline` has passed.
    fn commit_transition(&self, change: StateChange) -> WorkflowResult<ResultRecord>;

    /// Like [`ResultStore::commit_transition`], also recording `scores` as a new
    /// score version. Earlier versions are kept.
    fn apply_revision(&self, change: StateChange, scores: Scores) -> WorkflowResult<ResultRecord>;

    /// Score versions of a result, oldest first.
    fn score_history(&self, id: &ResultId) -> WorkflowResult<Vec<ScoreRevision>>;
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const RESULT_COLUMNS: &str = "id, student_id, course_id, session, ca, exam, final_score, grade, state, revision, lecturer_id, created_at, updated_at";

fn record_from_row(row: &Row) -> rusqlite::Result<ResultRecord> {
    let state = parse_state(8, row.get(8)?)?;
    let reveal = state.reveals_final_score();
    let final_score: Option<f64> = row.get(6)?;
    let grade = row
        .get::<_, Option<String>>(7)?
        .and_then(|g| Grade::from_str(&g));
    Ok(ResultRecord {
        id: ResultId(row.get(0)?),
        student_id: row.get::<_, i64>(1)? as u64,
        course_id: row.get(2)?,
        session: row.get(3)?,
        scores: Scores {
            ca: row.get(4)?,
            exam: row.get(5)?,
        },
        final_score: final_score.filter(|_| reveal),
        grade: grade.filter(|_| reveal),
        state,
        revision: row.get::<_, i64>(9)? as u64,
        lecturer_id: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn read_record(conn: &Connection, id: &ResultId) -> WorkflowResult<ResultRecord> {
    conn.query_row(
        &format!("SELECT {} FROM result WHERE id = ?1", RESULT_COLUMNS),
        params![id.0],
        record_from_row,
    )
    .optional()?
    .ok_or_else(|| WorkflowError::NotFound(id.clone()))
}

fn insert_score_revision(
    conn: &Connection,
    id: &ResultId,
    revision: u64,
    scores: &Scores,
    actor_id: usize,
    created_at: i64,
) -> WorkflowResult<()> {
    conn.execute(
        "INSERT INTO result_score_revision (result_id, revision, ca, exam, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.0,
            revision as i64,
            scores.ca,
            scores.exam,
            actor_id,
            created_at
        ],
    )?;
    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn stale(change: &StateChange, actual: u64) -> WorkflowError {
    WorkflowError::StaleState {
        id: change.result_id.clone(),
        expected: change.expected_revision,
        actual,
    }
}

/// How long a caller with a deadline sleeps between attempts on a busy connection.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(2);

fn check_deadline(deadline: Option<Instant>, stage: &str) -> WorkflowResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            debug!("Store deadline passed {}", stage);
            Err(WorkflowError::StorageUnavailable(format!(
                "deadline passed {}",
                stage
            )))
        }
        _ => Ok(()),
    }
}

/// Locks `conn`, waiting at most until `deadline` when one is given.
fn lock_until(
    conn: &Mutex<Connection>,
    deadline: Option<Instant>,
) -> WorkflowResult<MutexGuard<'_, Connection>> {
    let poisoned = || {
        error!("Result store connection lock poisoned");
        WorkflowError::StorageUnavailable("connection lock poisoned".to_string())
    };
    let Some(deadline) = deadline else {
        return conn.lock().map_err(|_| poisoned());
    };
    loop {
        match conn.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
            Err(TryLockError::WouldBlock) => {
                check_deadline(Some(deadline), "waiting for the write connection")?;
                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
        }
    }
}

/// Lookups use their own read-only connection, so a slow or stuck write never
/// holds up reads. Writes share the write connection and each one runs as a
/// single IMMEDIATE transaction.
#[derive(Clone)]
pub struct SqliteResultStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
    bounds: ScoreBounds,
}

impl SqliteResultStore {
    /// `busy_timeout` bounds how long a statement waits on another SQLite
    /// writer before failing with `StorageUnavailable`.
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        bounds: ScoreBounds,
        busy_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref();
        let write_conn = open_versioned_db(db_path, RESULTS_VERSIONED_SCHEMAS)?;
        write_conn.busy_timeout(busy_timeout)?;
        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on results write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open results database for reading")?;
        read_conn.busy_timeout(busy_timeout)?;

        Ok(SqliteResultStore {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
            bounds,
        })
    }

    /// An in-memory database cannot be opened twice, so reads and writes
    /// share one connection here.
    pub fn in_memory(bounds: ScoreBounds) -> anyhow::Result<Self> {
        let conn = Arc::new(Mutex::new(open_versioned_in_memory(
            RESULTS_VERSIONED_SCHEMAS,
        )?));
        Ok(SqliteResultStore {
            read_conn: conn.clone(),
            write_conn: conn,
            bounds,
        })
    }

    pub fn score_bounds(&self) -> ScoreBounds {
        self.bounds
    }

    fn reader(&self) -> WorkflowResult<MutexGuard<'_, Connection>> {
        lock_until(&self.read_conn, None)
    }

    fn commit_change(
        &self,
        change: &StateChange,
        new_scores: Option<Scores>,
    ) -> WorkflowResult<ResultRecord> {
        let mut conn = lock_until(&self.write_conn, change.deadline)?;
        check_deadline(change.deadline, "before starting the transaction")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = read_record(&tx, &change.result_id)?;
        if current.revision != change.expected_revision || current.state != change.from_state {
            debug!(
                "Stale write on result {}: expected revision {}, found {}",
                change.result_id, change.expected_revision, current.revision
            );
            return Err(stale(change, current.revision));
        }

        let scores = new_scores.unwrap_or(current.scores);
        let (final_score, grade) = if change.to_state.reveals_final_score() {
            let total = scores.total();
            (Some(total), Some(Grade::from_score(total)))
        } else {
            (None, None)
        };
        let new_revision = current.revision + 1;
        let now = now_millis();

        let updated = tx.execute(
            "UPDATE result SET state = ?1, revision = ?2, ca = ?3, exam = ?4, final_score = ?5, grade = ?6, updated_at = ?7
             WHERE id = ?8 AND revision = ?9",
            params![
                change.to_state.as_db_str(),
                new_revision as i64,
                scores.ca,
                scores.exam,
                final_score,
                grade.map(|g| g.as_str()),
                now,
                change.result_id.0,
                change.expected_revision as i64,
            ],
        )?;
        if updated == 0 {
            return Err(stale(change, current.revision));
        }

        if let Some(scores) = new_scores {
            insert_score_revision(
                &tx,
                &change.result_id,
                new_revision,
                &scores,
                change.actor_id,
                now,
            )?;
        }
        insert_transition(
            &tx,
            TransitionRecord {
                sequence: 0,
                result_id: change.result_id.clone(),
                from_state: current.state,
                to_state: change.to_state,
                actor_id: change.actor_id,
                actor_role: change.actor_role,
                revision: new_revision,
                timestamp: now,
                comment: change.comment.clone(),
            },
        )?;

        let record = read_record(&tx, &change.result_id)?;
        // Dropping `tx` rolls back, so a late caller never sees its write applied.
        check_deadline(change.deadline, "before commit")?;
        tx.commit()?;
        Ok(record)
    }
}

impl ResultStore for SqliteResultStore {
    fn create(
        &self,
        new_result: NewResult,
        lecturer_id: usize,
        deadline: Option<Instant>,
    ) -> WorkflowResult<ResultRecord> {
        self.bounds.validate_new_result(&new_result)?;
        let id = ResultId::generate();
        let now = now_millis();

        let mut conn = lock_until(&self.write_conn, deadline)?;
        check_deadline(deadline, "before starting the transaction")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO result (id, student_id, course_id, session, ca, exam, state, revision, lecturer_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?9)",
            params![
                id.0,
                new_result.student_id as i64,
                new_result.course_id,
                new_result.session,
                new_result.scores.ca,
                new_result.scores.exam,
                WorkflowState::Draft.as_db_str(),
                lecturer_id,
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err) => {
                return Err(WorkflowError::Validation(format!(
                    "A result for student {} in {} {} already exists",
                    new_result.student_id, new_result.course_id, new_result.session
                )));
            }
            Err(err) => return Err(err.into()),
        }
        insert_score_revision(&tx, &id, 0, &new_result.scores, lecturer_id, now)?;

        let record = read_record(&tx, &id)?;
        check_deadline(deadline, "before commit")?;
        tx.commit()?;
        Ok(record)
    }

    fn get(&self, id: &ResultId) -> WorkflowResult<ResultRecord> {
        let conn = self.reader()?;
        read_record(&conn, id)
    }

    fn list_by_state(
        &self,
        state: WorkflowState,
        filter: &ResultFilter,
    ) -> WorkflowResult<Vec<ResultRecord>> {
        let mut sql = format!("SELECT {} FROM result WHERE state = ?", RESULT_COLUMNS);
        let mut values: Vec<Value> = vec![Value::Text(state.as_db_str().to_string())];
        if let Some(course_id) = &filter.course_id {
            sql.push_str(" AND course_id = ?");
            values.push(Value::Text(course_id.clone()));
        }
        if let Some(session) = &filter.session {
            sql.push_str(" AND session = ?");
            values.push(Value::Text(session.clone()));
        }
        if let Some(student_id) = filter.student_id {
            sql.push_str(" AND student_id = ?");
            values.push(Value::Integer(student_id as i64));
        }
        if let Some(lecturer_id) = filter.lecturer_id {
            sql.push_str(" AND lecturer_id = ?");
            values.push(Value::Integer(lecturer_id as i64));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?");
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(filter.offset.unwrap_or(0) as i64));

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn commit_transition(&self, change: StateChange) -> WorkflowResult<ResultRecord> {
        self.commit_change(&change, None)
    }

    fn apply_revision(&self, change: StateChange, scores: Scores) -> WorkflowResult<ResultRecord> {
        self.bounds.validate_scores(&scores)?;
        self.commit_change(&change, Some(scores))
    }

    fn score_history(&self, id: &ResultId) -> WorkflowResult<Vec<ScoreRevision>> {
        let conn = self.reader()?;
        read_record(&conn, id)?;
        let mut stmt = conn.prepare(
            "SELECT result_id, revision, ca, exam, actor_id, created_at
             FROM result_score_revision WHERE result_id = ?1 ORDER BY revision ASC",
        )?;
        let revisions = stmt
            .query_map(params![id.0], |row| {
                Ok(ScoreRevision {
                    result_id: ResultId(row.get(0)?),
                    revision: row.get::<_, i64>(1)? as u64,
                    scores: Scores {
                        ca: row.get(2)?,
                        exam: row.get(3)?,
                    },
                    actor_id: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(revisions)
    }
}

impl AuditLog for SqliteResultStore {
    fn append(&self, record: TransitionRecord) -> WorkflowResult<TransitionRecord> {
        let conn = lock_until(&self.write_conn, None)?;
        read_record(&conn, &record.result_id)?;
        insert_transition(&conn, record)
    }

    fn history(&self, result_id: &ResultId) -> WorkflowResult<Vec<TransitionRecord>> {
        let conn = self.reader()?;
        load_history(&conn, result_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::BASE_DB_VERSION;
    use crate::user::UserRole;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    const LECTURER_ID: usize = 10;
    const HOD_ID: usize = 11;

    fn make_store() -> SqliteResultStore {
        SqliteResultStore::in_memory(ScoreBounds::default()).unwrap()
    }

    fn cs101(student_id: u64) -> NewResult {
        NewResult {
            student_id,
            course_id: "CS101".to_string(),
            session: "2025/1".to_string(),
            scores: Scores {
                ca: 20.0,
                exam: 55.0,
            },
        }
    }

    fn change(
        record: &ResultRecord,
        to_state: WorkflowState,
        actor_id: usize,
        actor_role: UserRole,
    ) -> StateChange {
        StateChange {
            result_id: record.id.clone(),
            expected_revision: record.revision,
            from_state: record.state,
            to_state,
            actor_id,
            actor_role,
            comment: None,
            deadline: None,
        }
    }

    #[test]
    fn creates_draft_at_revision_zero() {
        let store = make_store();
        let record = store.create(cs101(42), LECTURER_ID, None).unwrap();

        assert_eq!(record.state, WorkflowState::Draft);
        assert_eq!(record.revision, 0);
        assert_eq!(record.lecturer_id, LECTURER_ID);
        assert_eq!(record.final_score, None);
        assert_eq!(record.grade, None);
        assert_eq!(store.get(&record.id).unwrap(), record);
        assert!(store.history(&record.id).unwrap().is_empty());
        assert_eq!(store.score_history(&record.id).unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_out_of_range_scores() {
        let store = make_store();
        let mut input = cs101(42);
        input.scores.exam = 120.0;
        assert!(matches!(
            store.create(input, LECTURER_ID, None),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn create_rejects_duplicate_result_for_same_course_session() {
        let store = make_store();
        store.create(cs101(42), LECTURER_ID, None).unwrap();
        let err = store.create(cs101(42), LECTURER_ID, None).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(store.create(cs101(43), LECTURER_ID, None).is_ok());
    }

    #[test]
    fn get_unknown_result_is_not_found() {
        let store = make_store();
        assert!(matches!(
            store.get(&ResultId::from("missing")),
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            store.history(&ResultId::from("missing")),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn commit_transition_bumps_revision_and_appends_history() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();

        let submitted = store
            .commit_transition(change(
                &draft,
                WorkflowState::Submitted,
                LECTURER_ID,
                UserRole::Lecturer,
            ))
            .unwrap();
        assert_eq!(submitted.state, WorkflowState::Submitted);
        assert_eq!(submitted.revision, 1);

        let history = store.history(&draft.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_state, WorkflowState::Draft);
        assert_eq!(history[0].to_state, WorkflowState::Submitted);
        assert_eq!(history[0].actor_id, LECTURER_ID);
        assert_eq!(history[0].actor_role, UserRole::Lecturer);
        assert_eq!(history[0].revision, 1);
    }

    #[test]
    fn commit_with_outdated_revision_is_stale_and_leaves_no_trace() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();
        store
            .commit_transition(change(
                &draft,
                WorkflowState::Submitted,
                LECTURER_ID,
                UserRole::Lecturer,
            ))
            .unwrap();

        let err = store
            .commit_transition(change(
                &draft,
                WorkflowState::Submitted,
                LECTURER_ID,
                UserRole::Lecturer,
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StaleState {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store.history(&draft.id).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_commits_on_same_revision_have_one_winner() {
        let store = Arc::new(make_store());
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let change = change(
                    &draft,
                    WorkflowState::Submitted,
                    LECTURER_ID,
                    UserRole::Lecturer,
                );
                std::thread::spawn(move || store.commit_transition(change))
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, Err(WorkflowError::StaleState { .. })))
                .count(),
            1
        );
        assert_eq!(store.history(&draft.id).unwrap().len(), 1);
        assert_eq!(store.get(&draft.id).unwrap().revision, 1);
    }

    #[test]
    fn failed_audit_append_rolls_back_state_change() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();
        store
            .write_conn
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE result_transition;")
            .unwrap();

        let err = store
            .commit_transition(change(
                &draft,
                WorkflowState::Submitted,
                LECTURER_ID,
                UserRole::Lecturer,
            ))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StorageUnavailable(_)));

        let unchanged = store.get(&draft.id).unwrap();
        assert_eq!(unchanged.state, WorkflowState::Draft);
        assert_eq!(unchanged.revision, 0);
    }

    #[test]
    fn final_score_is_computed_on_approval_only() {
        let store = make_store();
        let mut record = store.create(cs101(42), LECTURER_ID, None).unwrap();
        let path = [
            (WorkflowState::Submitted, UserRole::Lecturer),
            (WorkflowState::DeptValidated, UserRole::Hod),
            (WorkflowState::FacultyRecommended, UserRole::Dean),
        ];
        for (to_state, role) in path {
            record = store
                .commit_transition(change(&record, to_state, HOD_ID, role))
                .unwrap();
            assert_eq!(record.final_score, None);
            assert_eq!(record.grade, None);
        }

        let approved = store
            .commit_transition(change(
                &record,
                WorkflowState::Approved,
                HOD_ID,
                UserRole::ExamOfficer,
            ))
            .unwrap();
        assert_eq!(approved.final_score, Some(75.0));
        assert_eq!(approved.grade, Some(Grade::A));

        let published = store
            .commit_transition(change(
                &approved,
                WorkflowState::Published,
                HOD_ID,
                UserRole::ExamOfficer,
            ))
            .unwrap();
        assert_eq!(published.final_score, Some(75.0));
        assert_eq!(store.get(&approved.id).unwrap().grade, Some(Grade::A));
    }

    #[test]
    fn apply_revision_keeps_previous_score_versions() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();

        let revised = store
            .apply_revision(
                change(&draft, WorkflowState::Draft, LECTURER_ID, UserRole::Lecturer),
                Scores {
                    ca: 25.0,
                    exam: 55.0,
                },
            )
            .unwrap();
        assert_eq!(revised.revision, 1);
        assert_eq!(revised.scores.ca, 25.0);

        let versions = store.score_history(&draft.id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].revision, 0);
        assert_eq!(versions[0].scores.ca, 20.0);
        assert_eq!(versions[1].revision, 1);
        assert_eq!(versions[1].scores.ca, 25.0);
    }

    #[test]
    fn apply_revision_validates_scores() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();
        let err = store
            .apply_revision(
                change(&draft, WorkflowState::Draft, LECTURER_ID, UserRole::Lecturer),
                Scores {
                    ca: -5.0,
                    exam: 10.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(store.get(&draft.id).unwrap().revision, 0);
    }

    #[test]
    fn list_by_state_applies_filters() {
        let store = make_store();
        let first = store.create(cs101(1), LECTURER_ID, None).unwrap();
        store.create(cs101(2), LECTURER_ID, None).unwrap();
        let mut other_course = cs101(3);
        other_course.course_id = "MTH201".to_string();
        store.create(other_course, LECTURER_ID + 1, None).unwrap();
        store
            .commit_transition(change(
                &first,
                WorkflowState::Submitted,
                LECTURER_ID,
                UserRole::Lecturer,
            ))
            .unwrap();

        let drafts = store
            .list_by_state(WorkflowState::Draft, &ResultFilter::default())
            .unwrap();
        assert_eq!(drafts.len(), 2);

        let cs_drafts = store
            .list_by_state(
                WorkflowState::Draft,
                &ResultFilter {
                    course_id: Some("CS101".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cs_drafts.len(), 1);
        assert_eq!(cs_drafts[0].student_id, 2);

        let by_lecturer = store
            .list_by_state(
                WorkflowState::Draft,
                &ResultFilter {
                    lecturer_id: Some(LECTURER_ID + 1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_lecturer.len(), 1);
        assert_eq!(by_lecturer[0].course_id, "MTH201");

        let paged = store
            .list_by_state(
                WorkflowState::Draft,
                &ResultFilter {
                    limit: Some(1),
                    offset: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(paged.len(), 1);

        let submitted = store
            .list_by_state(
                WorkflowState::Submitted,
                &ResultFilter {
                    student_id: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(submitted.len(), 1);
    }

    #[test]
    fn append_requires_existing_result() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();
        let record = TransitionRecord {
            sequence: 0,
            result_id: draft.id.clone(),
            from_state: WorkflowState::Draft,
            to_state: WorkflowState::Submitted,
            actor_id: LECTURER_ID,
            actor_role: UserRole::Lecturer,
            revision: 1,
            timestamp: now_millis(),
            comment: None,
        };

        let first = store.append(record.clone()).unwrap();
        let second = store.append(record.clone()).unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(store.history(&draft.id).unwrap().len(), 2);

        let orphan = TransitionRecord {
            result_id: ResultId::from("missing"),
            ..record
        };
        assert!(matches!(
            store.append(orphan),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn opens_and_migrates_version_zero_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("results.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            RESULTS_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
            conn.execute(
                "INSERT INTO result (id, student_id, course_id, session, ca, exam, state, revision, lecturer_id, created_at, updated_at)
                 VALUES ('legacy', 7, 'CS101', '2024/2', 30, 40, 'SUBMITTED', 3, 10, 1, 2)",
                [],
            )
            .unwrap();
        }

        let store = SqliteResultStore::new(
            &db_path,
            ScoreBounds::default(),
            Duration::from_millis(500),
        )
        .unwrap();
        let versions = store.score_history(&ResultId::from("legacy")).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].revision, 3);
        assert_eq!(versions[0].scores.exam, 40.0);

        let stored_version: i64 = store
            .write_conn
            .lock()
            .unwrap()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored_version, BASE_DB_VERSION as i64 + 1);
    }

    #[test]
    fn expired_deadline_writes_nothing() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();

        let mut late = change(
            &draft,
            WorkflowState::Submitted,
            LECTURER_ID,
            UserRole::Lecturer,
        );
        late.deadline = Some(Instant::now());
        let err = store.commit_transition(late).unwrap_err();
        assert!(matches!(err, WorkflowError::StorageUnavailable(_)));

        let unchanged = store.get(&draft.id).unwrap();
        assert_eq!(unchanged.state, WorkflowState::Draft);
        assert_eq!(unchanged.revision, 0);
        assert!(store.history(&draft.id).unwrap().is_empty());

        let err = store
            .create(cs101(43), LECTURER_ID, Some(Instant::now()))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StorageUnavailable(_)));
        assert!(store
            .list_by_state(WorkflowState::Draft, &ResultFilter::default())
            .unwrap()
            .iter()
            .all(|record| record.student_id != 43));
    }

    #[test]
    fn writer_stops_waiting_for_busy_connection_at_deadline() {
        let store = make_store();
        let draft = store.create(cs101(42), LECTURER_ID, None).unwrap();

        let held = store.write_conn.lock().unwrap();
        let writer = {
            let store = store.clone();
            let mut pending = change(
                &draft,
                WorkflowState::Submitted,
                LECTURER_ID,
                UserRole::Lecturer,
            );
            pending.deadline = Some(Instant::now() + Duration::from_millis(30));
            thread::spawn(move || store.commit_transition(pending))
        };
        let outcome = writer.join().unwrap();
        drop(held);

        assert!(matches!(
            outcome,
            Err(WorkflowError::StorageUnavailable(_))
        ));
        let unchanged = store.get(&draft.id).unwrap();
        assert_eq!(unchanged.state, WorkflowState::Draft);
        assert!(store.history(&draft.id).unwrap().is_empty());
    }

    #[test]
    fn busy_writer_does_not_block_reads_of_other_results() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteResultStore::new(
            temp_dir.path().join("results.db"),
            ScoreBounds::default(),
            Duration::from_millis(500),
        )
        .unwrap();
        let first = store.create(cs101(1), LECTURER_ID, None).unwrap();
        let second = store.create(cs101(2), LECTURER_ID, None).unwrap();

        // Stands in for a slow commit on `first`.
        let held = store.write_conn.lock().unwrap();
        let (tx, rx) = mpsc::channel();
        let reader = {
            let store = store.clone();
            let id = second.id.clone();
            thread::spawn(move || {
                let _ = tx.send(store.get(&id));
            })
        };
        let read = rx.recv_timeout(Duration::from_secs(2));
        drop(held);
        reader.join().unwrap();

        let read = read.expect("read should not wait on the writer").unwrap();
        assert_eq!(read.id, second.id);
        assert_eq!(read.state, WorkflowState::Draft);
        assert_eq!(store.get(&first.id).unwrap().revision, 0);
    }
}
