use crate::user::UserRole;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(pub String);

impl ResultId {
    pub fn generate() -> Self {
        ResultId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResultId {
    fn from(value: &str) -> Self {
        ResultId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Draft,
    Submitted,
    DeptValidated,
    FacultyRecommended,
    Approved,
    Published,
    Rejected,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 7] = [
        WorkflowState::Draft,
        WorkflowState::Submitted,
        WorkflowState::DeptValidated,
        WorkflowState::FacultyRecommended,
        WorkflowState::Approved,
        WorkflowState::Published,
        WorkflowState::Rejected,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            WorkflowState::Draft => "DRAFT",
            WorkflowState::Submitted => "SUBMITTED",
            WorkflowState::DeptValidated => "DEPT_VALIDATED",
            WorkflowState::FacultyRecommended => "FACULTY_RECOMMENDED",
            WorkflowState::Approved => "APPROVED",
            WorkflowState::Published => "PUBLISHED",
            WorkflowState::Rejected => "REJECTED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        WorkflowState::ALL
            .into_iter()
            .find(|state| state.as_db_str() == s)
    }

    /// Parses both the API spelling (`DeptValidated`) and the storage
    /// spelling (`DEPT_VALIDATED`), case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().replace(['_', '-'], "").to_lowercase();
        WorkflowState::ALL.into_iter().find(|state| {
            state.as_db_str().replace('_', "").to_lowercase() == normalized
        })
    }

    /// Final score and grade are only exposed from approval onwards.
    pub fn reveals_final_score(&self) -> bool {
        matches!(self, WorkflowState::Approved | WorkflowState::Published)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Component scores of a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Continuous assessment.
    pub ca: f64,
    pub exam: f64,
}

impl Scores {
    pub fn total(&self) -> f64 {
        self.ca + self.exam
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Grade {
        match score {
            s if s >= 70.0 => Grade::A,
            s if s >= 60.0 => Grade::B,
            s if s >= 50.0 => Grade::C,
            s if s >= 45.0 => Grade::D,
            s if s >= 40.0 => Grade::E,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Grade> {
        match s {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            "E" => Some(Grade::E),
            "F" => Some(Grade::F),
            _ => None,
        }
    }
}

/// Input of a new result, as sent by the lecturer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResult {
    pub student_id: u64,
    pub course_id: String,
    pub session: String,
    pub scores: Scores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: ResultId,
    pub student_id: u64,
    pub course_id: String,
    pub session: String,
    pub scores: Scores,
    pub final_score: Option<f64>,
    pub grade: Option<Grade>,
    pub state: WorkflowState,
    pub revision: u64,
    pub lecturer_id: usize,
    /// Unix millis.
    pub created_at: i64,
    /// Unix millis.
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub sequence: i64,
    pub result_id: ResultId,
    pub from_state: WorkflowState,
    pub to_state: WorkflowState,
    pub actor_id: usize,
    pub actor_role: UserRole,
    /// The record revision produced by this transition.
    pub revision: u64,
    /// Unix millis.
    pub timestamp: i64,
    pub comment: Option<String>,
}

/// An immutable version of a result's component scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRevision {
    pub result_id: ResultId,
    pub revision: u64,
    pub scores: Scores,
    pub actor_id: usize,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFilter {
    pub course_id: Option<String>,
    pub session: Option<String>,
    pub student_id: Option<u64>,
    pub lecturer_id: Option<usize>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A state change the store must apply atomically with its audit entry.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub result_id: ResultId,
    pub expected_revision: u64,
    pub from_state: WorkflowState,
    pub to_state: WorkflowState,
    pub actor_id: usize,
    pub actor_role: UserRole,
    pub comment: Option<String>,
    /// The store gives up without writing once this instant has passed.
    pub deadline: Option<Instant>,
}
