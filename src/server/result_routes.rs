//! HTTP surface of the result approval workflow.

use super::blocking::{run_until_deadline, run_with_timeout, BlockingCallError};
use super::metrics::{record_result_created, record_transition};
use super::session::Session;
use super::state::{GuardedWorkflowEngine, ServerState};
use super::ServerConfig;
use crate::results::{
    NewResult, ResultFilter, ResultId, ResultRecord, Scores, TransitionRequest, WorkflowError,
    WorkflowResult, WorkflowState,
};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::error;

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::ForbiddenTransition { .. } => StatusCode::FORBIDDEN,
            WorkflowError::CommentRequired => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::StaleState { .. } => StatusCode::CONFLICT,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        if let WorkflowError::StorageUnavailable(reason) = &self {
            error!("Result storage unavailable: {}", reason);
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}

impl From<BlockingCallError> for WorkflowError {
    fn from(err: BlockingCallError) -> Self {
        WorkflowError::StorageUnavailable(format!("store call {}", err))
    }
}

/// Read-only store work, abandoned after `timeout`.
async fn with_store_timeout<T, F>(timeout: Duration, call: F) -> WorkflowResult<T>
where
    F: FnOnce() -> WorkflowResult<T> + Send + 'static,
    T: Send + 'static,
{
    run_with_timeout(timeout, call).await?
}

/// Store writes. The store receives the deadline and rolls back once it has
/// passed, so a `StorageUnavailable` reply always means nothing was committed.
async fn with_store_deadline<T, F>(timeout: Duration, call: F) -> WorkflowResult<T>
where
    F: FnOnce(Instant) -> WorkflowResult<T> + Send + 'static,
    T: Send + 'static,
{
    run_until_deadline(timeout, call).await?
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> WorkflowResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| WorkflowError::Validation(rejection.body_text()))
}

fn parse_target_state(value: &str) -> WorkflowResult<WorkflowState> {
    WorkflowState::parse(value)
        .ok_or_else(|| WorkflowError::Validation(format!("Unknown workflow state '{}'", value)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultView {
    #[serde(flatten)]
    record: ResultRecord,
    available_transitions: Vec<WorkflowState>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TransitionBody {
    target_state: String,
    expected_revision: u64,
    comment: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RevisionBody {
    expected_revision: u64,
    scores: Scores,
    comment: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ListResultsQuery {
    state: String,
    course_id: Option<String>,
    session: Option<String>,
    student_id: Option<u64>,
    lecturer_id: Option<usize>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn create_result(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    body: Result<Json<NewResult>, JsonRejection>,
) -> Result<(StatusCode, Json<ResultRecord>), WorkflowError> {
    let new_result = parse_body(body)?;
    let actor = session.actor();
    let outcome = with_store_deadline(config.store_timeout, move |deadline| {
        engine.create_result(&actor, new_result, Some(deadline))
    })
    .await;
    record_result_created(match &outcome {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    });
    Ok((StatusCode::CREATED, Json(outcome?)))
}

async fn list_results(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    query: Result<Query<ListResultsQuery>, QueryRejection>,
) -> Result<Json<Vec<ResultRecord>>, WorkflowError> {
    let Query(query) = query.map_err(|r| WorkflowError::Validation(r.body_text()))?;
    let state = parse_target_state(&query.state)?;
    let filter = ResultFilter {
        course_id: query.course_id,
        session: query.session,
        student_id: query.student_id,
        lecturer_id: query.lecturer_id,
        limit: query.limit,
        offset: query.offset,
    };
    let actor = session.actor();
    let records = with_store_timeout(config.store_timeout, move || {
        engine.list_by_state(&actor, state, &filter)
    })
    .await?;
    Ok(Json(records))
}

async fn get_result(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
) -> Result<Json<ResultView>, WorkflowError> {
    let actor = session.actor();
    let view = with_store_timeout(config.store_timeout, move || {
        let record = engine.get_result(&actor, &ResultId(id))?;
        let available_transitions = engine.available_transitions(&actor, &record);
        Ok(ResultView {
            record,
            available_transitions,
        })
    })
    .await?;
    Ok(Json(view))
}

async fn transition_result(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Json<ResultRecord>, WorkflowError> {
    let body = parse_body(body)?;
    let target = parse_target_state(&body.target_state)?;
    let request = TransitionRequest {
        result_id: ResultId(id),
        target,
        expected_revision: body.expected_revision,
        comment: body.comment,
        deadline: None,
    };
    let actor = session.actor();
    let outcome = with_store_deadline(config.store_timeout, move |deadline| {
        let request = TransitionRequest {
            deadline: Some(deadline),
            ..request
        };
        engine.transition(&actor, request)
    })
    .await;
    record_transition(
        &target.to_string(),
        match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        },
    );
    Ok(Json(outcome?))
}

async fn revise_result(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
    body: Result<Json<RevisionBody>, JsonRejection>,
) -> Result<Json<ResultRecord>, WorkflowError> {
    let body = parse_body(body)?;
    let actor = session.actor();
    let record = with_store_deadline(config.store_timeout, move |deadline| {
        engine.apply_revision(
            &actor,
            &ResultId(id),
            body.expected_revision,
            body.scores,
            body.comment,
            Some(deadline),
        )
    })
    .await?;
    Ok(Json(record))
}

async fn get_history(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
) -> Response {
    let actor = session.actor();
    match with_store_timeout(config.store_timeout, move || {
        engine.history(&actor, &ResultId(id))
    })
    .await
    {
        Ok(history) => Json(history).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_score_history(
    session: Session,
    State(engine): State<GuardedWorkflowEngine>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
) -> Response {
    let actor = session.actor();
    match with_store_timeout(config.store_timeout, move || {
        engine.score_history(&actor, &ResultId(id))
    })
    .await
    {
        Ok(versions) => Json(versions).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn make_result_routes(state: ServerState) -> Router {
    Router::new()
        .route("/", post(create_result).get(list_results))
        .route("/{id}", get(get_result))
        .route("/{id}/transition", post(transition_result))
        .route("/{id}/history", get(get_history))
        .route("/{id}/revision", post(revise_result))
        .route("/{id}/scores", get(get_score_history))
        .with_state(state)
}
