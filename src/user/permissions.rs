use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ViewPublishedResults,
    ViewResults,
    CreateResults,
    ManageUsers,
}

const STUDENT_PERMISSIONS: &[Permission] = &[Permission::ViewPublishedResults];
const LECTURER_PERMISSIONS: &[Permission] = &[Permission::ViewResults, Permission::CreateResults];
const REVIEWER_PERMISSIONS: &[Permission] = &[Permission::ViewResults];
const ADMIN_PERMISSIONS: &[Permission] = &[Permission::ViewResults, Permission::ManageUsers];

/// The single active role of an actor. Workflow edges and score revisions are
/// gated on this value directly; permissions cover creating and viewing
/// results and user management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Lecturer,
    Hod,
    Dean,
    ExamOfficer,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 6] = [
        UserRole::Student,
        UserRole::Lecturer,
        UserRole::Hod,
        UserRole::Dean,
        UserRole::ExamOfficer,
        UserRole::Admin,
    ];

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            UserRole::Student => STUDENT_PERMISSIONS,
            UserRole::Lecturer => LECTURER_PERMISSIONS,
            UserRole::Hod | UserRole::Dean | UserRole::ExamOfficer => REVIEWER_PERMISSIONS,
            UserRole::Admin => ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Lecturer => "lecturer",
            UserRole::Hod => "hod",
            UserRole::Dean => "dean",
            UserRole::ExamOfficer => "exam_officer",
            UserRole::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "student" => Some(UserRole::Student),
            "lecturer" => Some(UserRole::Lecturer),
            "hod" => Some(UserRole::Hod),
            "dean" => Some(UserRole::Dean),
            "exam_officer" | "examofficer" => Some(UserRole::ExamOfficer),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_round_trip() {
        for role in UserRole::ALL {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_parsing_is_lenient_on_case_and_separator() {
        assert_eq!(UserRole::from_str("HOD"), Some(UserRole::Hod));
        assert_eq!(UserRole::from_str("Exam-Officer"), Some(UserRole::ExamOfficer));
        assert_eq!(UserRole::from_str("ExamOfficer"), Some(UserRole::ExamOfficer));
        assert_eq!(UserRole::from_str(" dean "), Some(UserRole::Dean));
        assert_eq!(UserRole::from_str("registrar"), None);
    }

    #[test]
    fn only_lecturers_create_results() {
        for role in UserRole::ALL {
            assert_eq!(
                role.has_permission(Permission::CreateResults),
                role == UserRole::Lecturer,
                "{}",
                role
            );
        }
    }

    #[test]
    fn students_only_see_published_results() {
        assert_eq!(
            UserRole::Student.permissions(),
            &[Permission::ViewPublishedResults]
        );
        assert!(!UserRole::Student.has_permission(Permission::ViewResults));
    }

    #[test]
    fn only_admin_manages_users() {
        let managers: Vec<UserRole> = UserRole::ALL
            .into_iter()
            .filter(|r| r.has_permission(Permission::ManageUsers))
            .collect();
        assert_eq!(managers, vec![UserRole::Admin]);
    }

    #[test]
    fn role_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&UserRole::ExamOfficer).unwrap(),
            "\"exam_officer\""
        );
    }
}
