use super::blocking::run_with_timeout;
use super::state::ServerState;
use crate::user::{Actor, AuthError, AuthTokenValue, Permission, UserRole};

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use tracing::{debug, error};

/// The caller of a request, resolved from its session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: usize,
    pub handle: String,
    pub role: UserRole,
    pub token: String,
    pub permissions: Vec<Permission>,
}

impl Session {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.handle.clone(), self.role)
    }
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

#[derive(Debug)]
pub enum SessionExtractionError {
    Unauthenticated,
    StorageUnavailable,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> Response {
        match self {
            SessionExtractionError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "unauthenticated",
                    "message": "Missing, unknown or expired session token",
                })),
            )
                .into_response(),
            SessionExtractionError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "storage_unavailable",
                    "message": "Session lookup did not complete in time",
                })),
            )
                .into_response(),
            SessionExtractionError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

async fn extract_session_token_from_cookies(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Option<String> {
    // CookieJar's rejection is Infallible.
    let jar = CookieJar::from_request_parts(parts, ctx).await.ok()?;
    jar.get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Result<Option<Session>, SessionExtractionError> {
    let token = match extract_session_token_from_cookies(parts, ctx)
        .await
        .or_else(|| extract_session_token_from_headers(parts))
    {
        None => {
            debug!("No token in cookies nor headers.");
            return Ok(None);
        }
        Some(x) => x,
    };

    let token_value = AuthTokenValue(token);
    let user_manager = ctx.user_manager.clone();
    let lookup = token_value.clone();
    let verified = run_with_timeout(ctx.config.store_timeout, move || {
        user_manager.verify_token(&lookup)
    })
    .await
    .map_err(|e| {
        error!("Session lookup failed: {}", e);
        SessionExtractionError::StorageUnavailable
    })?;
    match verified {
        Ok(actor) => {
            debug!("Resolved session of {} ({})", actor.handle, actor.role);
            Ok(Some(Session {
                user_id: actor.user_id,
                handle: actor.handle,
                role: actor.role,
                token: token_value.0,
                permissions: actor.role.permissions().to_vec(),
            }))
        }
        Err(AuthError::Unauthenticated) => {
            debug!("Session token rejected");
            Ok(None)
        }
        Err(AuthError::Storage(e)) => {
            error!("Failed to verify session token: {:#}", e);
            Err(SessionExtractionError::InternalError)
        }
    }
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
            .await?
            .ok_or(SessionExtractionError::Unauthenticated)
    }
}

impl OptionalFromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}
