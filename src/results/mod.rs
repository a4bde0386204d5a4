mod audit_log;
pub mod edges;
mod engine;
mod error;
mod models;
mod schema;
mod store;
mod validation;

pub use audit_log::AuditLog;
pub use engine::{TransitionRequest, WorkflowEngine};
pub use error::{WorkflowError, WorkflowResult};
pub use models::{
    Grade, NewResult, ResultFilter, ResultId, ResultRecord, ScoreRevision, Scores, StateChange,
    TransitionRecord, WorkflowState,
};
pub use schema::RESULTS_VERSIONED_SCHEMAS;
pub use store::{ResultStore, SqliteResultStore};
pub use validation::ScoreBounds;
