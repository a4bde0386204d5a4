//! Role-gated transitions over a [`ResultStore`].
//!
//! The engine resolves which edge a request wants, checks that the caller's
//! role owns that edge, and hands the change to the store, which applies it
//! together with its audit entry or not at all. The engine holds no state of
//! its own besides the store handle; the caller identity arrives per call as
//! an [`Actor`].

use super::edges;
use super::error::{WorkflowError, WorkflowResult};
use super::models::{
    NewResult, ResultFilter, ResultId, ResultRecord, ScoreRevision, Scores, StateChange,
    TransitionRecord, WorkflowState,
};
use super::store::ResultStore;
use crate::user::{Actor, Permission};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub result_id: ResultId,
    pub target: WorkflowState,
    pub expected_revision: u64,
    pub comment: Option<String>,
    /// Passed on to the store, which writes nothing once it has passed.
    pub deadline: Option<Instant>,
}

fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn forbidden(actor: &Actor, from: Option<WorkflowState>, to: WorkflowState) -> WorkflowError {
    warn!(
        "Forbidden transition {:?} -> {} attempted by {} ({})",
        from, to, actor.handle, actor.role
    );
    WorkflowError::ForbiddenTransition {
        from,
        to,
        role: actor.role,
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn ResultStore>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        WorkflowEngine { store }
    }

    fn may_view(actor: &Actor, state: WorkflowState) -> bool {
        actor.role.has_permission(Permission::ViewResults)
            || (state == WorkflowState::Published
                && actor.role.has_permission(Permission::ViewPublishedResults))
    }

    /// A record the actor may not view does not exist for them.
    fn visible_to(actor: &Actor, record: ResultRecord) -> WorkflowResult<ResultRecord> {
        if Self::may_view(actor, record.state) {
            Ok(record)
        } else {
            Err(WorkflowError::NotFound(record.id))
        }
    }

    pub fn create_result(
        &self,
        actor: &Actor,
        new_result: NewResult,
        deadline: Option<Instant>,
    ) -> WorkflowResult<ResultRecord> {
        if !actor.role.has_permission(Permission::CreateResults) {
            return Err(forbidden(actor, None, WorkflowState::Draft));
        }
        let record = self.store.create(new_result, actor.user_id, deadline)?;
        info!(
            "Result {} created by {} for student {} in {} {}",
            record.id, actor.handle, record.student_id, record.course_id, record.session
        );
        Ok(record)
    }

    pub fn get_result(&self, actor: &Actor, result_id: &ResultId) -> WorkflowResult<ResultRecord> {
        Self::visible_to(actor, self.store.get(result_id)?)
    }

    pub fn list_by_state(
        &self,
        actor: &Actor,
        state: WorkflowState,
        filter: &ResultFilter,
    ) -> WorkflowResult<Vec<ResultRecord>> {
        if !Self::may_view(actor, state) {
            return Ok(vec![]);
        }
        self.store.list_by_state(state, filter)
    }

    /// Targets the actor could move `record` to right now.
    pub fn available_transitions(&self, actor: &Actor, record: &ResultRecord) -> Vec<WorkflowState> {
        edges::available_targets(record.state, actor.role)
    }

    pub fn transition(
        &self,
        actor: &Actor,
        request: TransitionRequest,
    ) -> WorkflowResult<ResultRecord> {
        let comment = normalize_comment(request.comment);
        if request.target == WorkflowState::Rejected && comment.is_none() {
            return Err(WorkflowError::CommentRequired);
        }

        let record = self.get_result(actor, &request.result_id)?;
        if record.revision != request.expected_revision {
            debug!(
                "Result {} is at revision {}, request expected {}",
                record.id, record.revision, request.expected_revision
            );
            return Err(WorkflowError::StaleState {
                id: record.id,
                expected: request.expected_revision,
                actual: record.revision,
            });
        }

        match edges::required_role(record.state, request.target) {
            Some(role) if role == actor.role => {}
            _ => return Err(forbidden(actor, Some(record.state), request.target)),
        }

        if request.target == WorkflowState::Draft {
            let scores = record.scores;
            return self.commit_revision(actor, record, scores, comment, request.deadline);
        }

        let from_state = record.state;
        let updated = self.store.commit_transition(StateChange {
            result_id: record.id,
            expected_revision: request.expected_revision,
            from_state,
            to_state: request.target,
            actor_id: actor.user_id,
            actor_role: actor.role,
            comment,
            deadline: request.deadline,
        })?;
        info!(
            "Result {} moved {} -> {} by {} (revision {})",
            updated.id, from_state, updated.state, actor.handle, updated.revision
        );
        Ok(updated)
    }

    /// Replaces the scores of a Draft or Rejected result with `scores`,
    /// leaving it in Draft. Previous scores stay in the score history.
    pub fn apply_revision(
        &self,
        actor: &Actor,
        result_id: &ResultId,
        expected_revision: u64,
        scores: Scores,
        comment: Option<String>,
        deadline: Option<Instant>,
    ) -> WorkflowResult<ResultRecord> {
        let record = self.get_result(actor, result_id)?;
        if record.revision != expected_revision {
            return Err(WorkflowError::StaleState {
                id: record.id,
                expected: expected_revision,
                actual: record.revision,
            });
        }
        match edges::revision_role(record.state) {
            Some(role) if role == actor.role => {}
            _ => return Err(forbidden(actor, Some(record.state), WorkflowState::Draft)),
        }
        self.commit_revision(actor, record, scores, normalize_comment(comment), deadline)
    }

    fn commit_revision(
        &self,
        actor: &Actor,
        record: ResultRecord,
        scores: Scores,
        comment: Option<String>,
        deadline: Option<Instant>,
    ) -> WorkflowResult<ResultRecord> {
        let from_state = record.state;
        let updated = self.store.apply_revision(
            StateChange {
                result_id: record.id,
                expected_revision: record.revision,
                from_state,
                to_state: WorkflowState::Draft,
                actor_id: actor.user_id,
                actor_role: actor.role,
                comment,
                deadline,
            },
            scores,
        )?;
        info!(
            "Result {} revised from {} by {} (revision {})",
            updated.id, from_state, actor.handle, updated.revision
        );
        Ok(updated)
    }

    pub fn history(
        &self,
        actor: &Actor,
        result_id: &ResultId,
    ) -> WorkflowResult<Vec<TransitionRecord>> {
        self.get_result(actor, result_id)?;
        self.store.history(result_id)
    }

    pub fn score_history(
        &self,
        actor: &Actor,
        result_id: &ResultId,
    ) -> WorkflowResult<Vec<ScoreRevision>> {
        self.get_result(actor, result_id)?;
        self.store.score_history(result_id)
    }
}
