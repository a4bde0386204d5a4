//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint. When routes or request
//! formats change, update only this file.

use super::constants::*;
use super::fixtures::credentials_for;
use reqwest::Response;
use serde_json::{json, Value};
use srms_server::user::UserRole;
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    /// Creates a new unauthenticated client.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client logged in as the seeded user holding `role`.
    ///
    /// # Panics
    ///
    /// Panics if the login is refused.
    pub async fn authenticated_as(base_url: String, role: UserRole) -> Self {
        let client = Self::new(base_url);
        let (handle, password) = credentials_for(role);

        let response = client.login(handle, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Login as {} failed: {:?}",
            handle,
            response.text().await
        );

        client
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/login
    pub async fn login(&self, handle: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/login", self.base_url))
            .json(&json!({
                "user_handle": handle,
                "password": password,
            }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /v1/auth/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(format!("{}/v1/auth/logout", self.base_url))
            .send()
            .await
            .expect("Logout request failed")
    }

    /// GET /v1/auth/session
    pub async fn get_session(&self) -> Response {
        self.client
            .get(format!("{}/v1/auth/session", self.base_url))
            .send()
            .await
            .expect("Get session request failed")
    }

    // ========================================================================
    // Result Endpoints
    // ========================================================================

    /// POST /v1/results
    pub async fn create_result(&self, student_id: u64, ca: f64, exam: f64) -> Response {
        self.create_result_raw(json!({
            "studentId": student_id,
            "courseId": COURSE_ID,
            "session": ACADEMIC_SESSION,
            "scores": { "ca": ca, "exam": exam },
        }))
        .await
    }

    /// POST /v1/results with an arbitrary body
    pub async fn create_result_raw(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/v1/results", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Create result request failed")
    }

    /// GET /v1/results/{id}
    pub async fn get_result(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/v1/results/{}", self.base_url, id))
            .send()
            .await
            .expect("Get result request failed")
    }

    /// GET /v1/results?state=...
    pub async fn list_results(&self, state: &str, extra: &[(&str, &str)]) -> Response {
        let mut query = vec![("state", state)];
        query.extend_from_slice(extra);
        self.client
            .get(format!("{}/v1/results", self.base_url))
            .query(&query)
            .send()
            .await
            .expect("List results request failed")
    }

    /// POST /v1/results/{id}/transition
    pub async fn transition(
        &self,
        id: &str,
        target_state: &str,
        expected_revision: u64,
        comment: Option<&str>,
    ) -> Response {
        self.client
            .post(format!("{}/v1/results/{}/transition", self.base_url, id))
            .json(&json!({
                "targetState": target_state,
                "expectedRevision": expected_revision,
                "comment": comment,
            }))
            .send()
            .await
            .expect("Transition request failed")
    }

    /// POST /v1/results/{id}/revision
    pub async fn revise(
        &self,
        id: &str,
        expected_revision: u64,
        ca: f64,
        exam: f64,
        comment: Option<&str>,
    ) -> Response {
        self.client
            .post(format!("{}/v1/results/{}/revision", self.base_url, id))
            .json(&json!({
                "expectedRevision": expected_revision,
                "scores": { "ca": ca, "exam": exam },
                "comment": comment,
            }))
            .send()
            .await
            .expect("Revision request failed")
    }

    /// GET /v1/results/{id}/history
    pub async fn get_history(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/v1/results/{}/history", self.base_url, id))
            .send()
            .await
            .expect("Get history request failed")
    }

    /// GET /v1/results/{id}/scores
    pub async fn get_score_history(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/v1/results/{}/scores", self.base_url, id))
            .send()
            .await
            .expect("Get score history request failed")
    }

    // ========================================================================
    // Admin Endpoints
    // ========================================================================

    /// POST /v1/admin/users
    pub async fn admin_create_user(&self, handle: &str, role: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/admin/users", self.base_url))
            .json(&json!({
                "handle": handle,
                "role": role,
                "password": password,
            }))
            .send()
            .await
            .expect("Create user request failed")
    }

    /// GET /v1/admin/users
    pub async fn admin_list_users(&self) -> Response {
        self.client
            .get(format!("{}/v1/admin/users", self.base_url))
            .send()
            .await
            .expect("List users request failed")
    }
}
