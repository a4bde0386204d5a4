use super::error::{WorkflowError, WorkflowResult};
use super::models::{NewResult, Scores};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COURSE_ID_REGEX: Regex =
        Regex::new(r"^[A-Za-z]{2,6} ?[0-9]{3}[A-Za-z]?$").expect("valid course id regex");
    static ref SESSION_REGEX: Regex =
        Regex::new(r"^[0-9]{4}/[0-9]{1,2}$").expect("valid session regex");
}

/// Inclusive range every score component, and their total, must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for ScoreBounds {
    fn default() -> Self {
        ScoreBounds {
            min: 0.0,
            max: 100.0,
        }
    }
}

impl ScoreBounds {
    fn check(&self, label: &str, value: f64) -> WorkflowResult<()> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(WorkflowError::Validation(format!(
                "{} score {} is outside {}..={}",
                label, value, self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn validate_scores(&self, scores: &Scores) -> WorkflowResult<()> {
        self.check("CA", scores.ca)?;
        self.check("Exam", scores.exam)?;
        self.check("Total", scores.total())
    }

    pub fn validate_new_result(&self, new_result: &NewResult) -> WorkflowResult<()> {
        if new_result.student_id == 0 {
            return Err(WorkflowError::Validation(
                "studentId must be positive".to_string(),
            ));
        }
        if !COURSE_ID_REGEX.is_match(&new_result.course_id) {
            return Err(WorkflowError::Validation(format!(
                "Invalid course id '{}'",
                new_result.course_id
            )));
        }
        if !SESSION_REGEX.is_match(&new_result.session) {
            return Err(WorkflowError::Validation(format!(
                "Invalid session '{}', expected YYYY/N",
                new_result.session
            )));
        }
        self.validate_scores(&new_result.scores)
    }
}
