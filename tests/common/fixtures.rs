//! Test database fixtures

use super::constants::*;
use anyhow::Result;
use srms_server::user::{SqliteUserStore, UserManager, UserRole, DEFAULT_TOKEN_TTL};
use std::sync::Arc;
use tempfile::TempDir;

/// Handle, password and role of every seeded user.
pub const SEEDED_USERS: [(&str, &str, UserRole); 6] = [
    (LECTURER_USER, LECTURER_PASS, UserRole::Lecturer),
    (HOD_USER, HOD_PASS, UserRole::Hod),
    (DEAN_USER, DEAN_PASS, UserRole::Dean),
    (EXAM_OFFICER_USER, EXAM_OFFICER_PASS, UserRole::ExamOfficer),
    (STUDENT_USER, STUDENT_PASS, UserRole::Student),
    (ADMIN_USER, ADMIN_PASS, UserRole::Admin),
];

/// Credentials of the seeded user holding `role`.
pub fn credentials_for(role: UserRole) -> (&'static str, &'static str) {
    SEEDED_USERS
        .iter()
        .find(|(_, _, r)| *r == role)
        .map(|(handle, pass, _)| (*handle, *pass))
        .expect("every role has a seeded user")
}

/// Creates a temp dir holding a user database with one user per role.
///
/// Returns the temp dir (which must be kept alive) and the db path.
pub fn create_test_db_with_users() -> Result<(TempDir, String)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("user.db");

    {
        let store = Arc::new(SqliteUserStore::new(&db_path)?);
        let user_manager = UserManager::new(store, DEFAULT_TOKEN_TTL);
        for (handle, password, role) in SEEDED_USERS {
            let user_id = user_manager.add_user_with_password(handle, role, password)?;
            eprintln!("Created {} user {} with id {}", role.as_str(), handle, user_id);
        }
    }

    let path_str = db_path.to_string_lossy().into_owned();
    Ok((temp_dir, path_str))
}
