//! The approval chain as data.
//!
//! Every permitted move is one row of [`EDGES`]; the engine never branches on
//! states itself. Adding a stage means adding rows here.

use super::models::WorkflowState::{self, *};
use crate::user::UserRole;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub role: UserRole,
}

const fn edge(from: WorkflowState, to: WorkflowState, role: UserRole) -> Edge {
    Edge { from, to, role }
}

pub const EDGES: &[Edge] = &[
    edge(Draft, Submitted, UserRole::Lecturer),
    edge(Submitted, DeptValidated, UserRole::Hod),
    edge(Submitted, Rejected, UserRole::Hod),
    edge(DeptValidated, FacultyRecommended, UserRole::Dean),
    edge(DeptValidated, Rejected, UserRole::Dean),
    edge(FacultyRecommended, Approved, UserRole::ExamOfficer),
    edge(FacultyRecommended, Rejected, UserRole::ExamOfficer),
    edge(Approved, Published, UserRole::ExamOfficer),
    // Reopening goes through a score revision.
    edge(Rejected, Draft, UserRole::Lecturer),
];

/// States whose scores may be replaced, and by whom. A revision always lands in Draft.
pub const REVISIONS: &[Edge] = &[
    edge(Draft, Draft, UserRole::Lecturer),
    edge(Rejected, Draft, UserRole::Lecturer),
];

lazy_static! {
    static ref EDGE_TABLE: HashMap<(WorkflowState, WorkflowState), UserRole> = EDGES
        .iter()
        .map(|e| ((e.from, e.to), e.role))
        .collect();
}

/// The single role allowed to move a result from `from` to `to`, if that move exists.
pub fn required_role(from: WorkflowState, to: WorkflowState) -> Option<UserRole> {
    EDGE_TABLE.get(&(from, to)).copied()
}

/// The role allowed to revise the scores of a result sitting in `from`.
pub fn revision_role(from: WorkflowState) -> Option<UserRole> {
    REVISIONS.iter().find(|e| e.from == from).map(|e| e.role)
}

/// Targets reachable from `from` by an actor with `role`, in table order.
pub fn available_targets(from: WorkflowState, role: UserRole) -> Vec<WorkflowState> {
    EDGES
        .iter()
        .filter(|e| e.from == from && e.role == role)
        .map(|e| e.to)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_edge_has_exactly_one_role() {
        assert_eq!(EDGE_TABLE.len(), EDGES.len());
    }

    #[test]
    fn lookup_matches_table() {
        assert_eq!(required_role(Draft, Submitted), Some(UserRole::Lecturer));
        assert_eq!(required_role(Submitted, DeptValidated), Some(UserRole::Hod));
        assert_eq!(
            required_role(FacultyRecommended, Approved),
            Some(UserRole::ExamOfficer)
        );
        assert_eq!(required_role(Draft, DeptValidated), None);
        assert_eq!(required_role(Approved, Rejected), None);
        assert_eq!(required_role(Published, Draft), None);
    }

    #[test]
    fn published_is_terminal() {
        for role in UserRole::ALL {
            assert!(available_targets(Published, role).is_empty());
        }
    }

    #[test]
    fn rejection_reachable_only_from_review_stages() {
        let sources: Vec<WorkflowState> = EDGES
            .iter()
            .filter(|e| e.to == Rejected)
            .map(|e| e.from)
            .collect();
        assert_eq!(sources, vec![Submitted, DeptValidated, FacultyRecommended]);
    }

    #[test]
    fn available_targets_per_role() {
        assert_eq!(
            available_targets(Submitted, UserRole::Hod),
            vec![DeptValidated, Rejected]
        );
        assert!(available_targets(Submitted, UserRole::Dean).is_empty());
        assert_eq!(available_targets(Rejected, UserRole::Lecturer), vec![Draft]);
        for state in WorkflowState::ALL {
            assert!(available_targets(state, UserRole::Student).is_empty());
            assert!(available_targets(state, UserRole::Admin).is_empty());
        }
    }

    #[test]
    fn only_draft_and_rejected_are_revisable() {
        for state in WorkflowState::ALL {
            let expected = match state {
                Draft | Rejected => Some(UserRole::Lecturer),
                _ => None,
            };
            assert_eq!(revision_role(state), expected, "{}", state);
        }
        assert!(REVISIONS.iter().all(|e| e.to == Draft));
    }
}
