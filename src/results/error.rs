use super::models::{ResultId, WorkflowState};
use crate::user::UserRole;
use thiserror::Error;

fn describe_source(from: &Option<WorkflowState>) -> String {
    match from {
        Some(state) => state.to_string(),
        None => "nothing".to_string(),
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No edge from `from` to `to`, or the edge belongs to another role.
    /// `from` is `None` when creating a result.
    #[error("Role {role} may not move a result from {} to {to}", describe_source(.from))]
    ForbiddenTransition {
        from: Option<WorkflowState>,
        to: WorkflowState,
        role: UserRole,
    },

    #[error("A comment is required to reject a result")]
    CommentRequired,

    #[error("Result {id} is at revision {actual}, but revision {expected} was expected")]
    StaleState {
        id: ResultId,
        expected: u64,
        actual: u64,
    },

    #[error("Result not found: {0}")]
    NotFound(ResultId),

    #[error("Result storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl WorkflowError {
    /// Stable identifier for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::ForbiddenTransition { .. } => "forbidden_transition",
            WorkflowError::CommentRequired => "comment_required",
            WorkflowError::StaleState { .. } => "stale_state",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(err: rusqlite::Error) -> Self {
        WorkflowError::StorageUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        WorkflowError::StorageUnavailable(format!("{:#}", err))
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
