//! Shared constants for end-to-end tests
//!
//! When seeded users or request defaults change, update only this file.

// ============================================================================
// Seeded Users
// ============================================================================

pub const LECTURER_USER: &str = "lecturer";
pub const LECTURER_PASS: &str = "lecturerpass123";

pub const HOD_USER: &str = "hod";
pub const HOD_PASS: &str = "hodpass123";

pub const DEAN_USER: &str = "dean";
pub const DEAN_PASS: &str = "deanpass123";

pub const EXAM_OFFICER_USER: &str = "exam_officer";
pub const EXAM_OFFICER_PASS: &str = "officerpass123";

pub const STUDENT_USER: &str = "student";
pub const STUDENT_PASS: &str = "studentpass123";

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "adminpass123";

// ============================================================================
// Result Fixtures
// ============================================================================

pub const COURSE_ID: &str = "CSC401";
pub const ACADEMIC_SESSION: &str = "2025/1";

// ============================================================================
// Timeouts
// ============================================================================

/// How long to wait for a freshly spawned server to answer.
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
