use anyhow::{Context, Result};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::results::WorkflowEngine;
use crate::user::{Permission, UserManager, UserRole};
use axum_extra::extract::cookie::{Cookie, SameSite};

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::blocking::{run_with_timeout, BlockingCallError};
use super::metrics::{metrics_handler, record_login_attempt};
use super::result_routes::make_result_routes;
use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::{log_requests, state::*, ServerConfig};
use crate::user::AuthTokenValue;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize)]
struct LoginBody {
    pub user_handle: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    user_id: usize,
    handle: String,
    role: UserRole,
    permissions: Vec<Permission>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserBody {
    handle: String,
    role: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    user_id: usize,
    handle: String,
    role: UserRole,
}

enum CreateUserOutcome {
    Created(usize),
    Exists,
    Rejected(anyhow::Error),
    LookupFailed(anyhow::Error),
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": error, "message": message.into() })),
    )
        .into_response()
}

fn storage_unavailable(err: BlockingCallError) -> Response {
    error!("User store call failed: {}", err);
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "storage_unavailable",
        format!("User store call {}", err),
    )
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<LoginBody>,
) -> Response {
    debug!("login() called for {}", body.user_handle);
    let start = Instant::now();
    // Password hashing runs to completion so an issued token is never lost.
    let outcome = match tokio::task::spawn_blocking(move || {
        user_manager.login(&body.user_handle, &body.password)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            record_login_attempt("error", start.elapsed());
            return storage_unavailable(err.into());
        }
    };
    match outcome {
        Ok(Some(auth_token)) => {
            record_login_attempt("success", start.elapsed());
            let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, auth_token.value.0.clone()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build();
            (
                StatusCode::CREATED,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(LoginSuccessResponse {
                    token: auth_token.value.0,
                }),
            )
                .into_response()
        }
        Ok(None) => {
            record_login_attempt("failure", start.elapsed());
            error_response(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Invalid handle or password",
            )
        }
        Err(err) => {
            record_login_attempt("error", start.elapsed());
            error!("Login failed: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(
    State(user_manager): State<GuardedUserManager>,
    State(config): State<ServerConfig>,
    session: Session,
) -> Response {
    let token = AuthTokenValue(session.token);
    let outcome = match run_with_timeout(config.store_timeout, move || {
        user_manager.delete_auth_token(&token)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => return storage_unavailable(err),
    };
    match outcome {
        Ok(_) => {
            let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
                .same_site(SameSite::Lax)
                .build();
            (StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]).into_response()
        }
        Err(err) => {
            error!("Failed to delete auth token: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_session(session: Session) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: session.user_id,
        handle: session.handle,
        role: session.role,
        permissions: session.permissions,
    })
}

async fn create_user(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CreateUserBody>,
) -> Response {
    if !session.has_permission(Permission::ManageUsers) {
        return error_response(StatusCode::FORBIDDEN, "forbidden", "ManageUsers required");
    }
    let role = match UserRole::from_str(&body.role) {
        Some(role) => role,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("Unknown role '{}'", body.role),
            )
        }
    };
    let handle = body.handle.clone();
    // Runs to completion so a reply never disagrees with what was stored.
    let outcome = tokio::task::spawn_blocking(move || {
        match user_manager.get_user_by_handle(&body.handle) {
            Ok(Some(_)) => CreateUserOutcome::Exists,
            Ok(None) => {
                match user_manager.add_user_with_password(&body.handle, role, &body.password) {
                    Ok(user_id) => CreateUserOutcome::Created(user_id),
                    Err(err) => CreateUserOutcome::Rejected(err),
                }
            }
            Err(err) => CreateUserOutcome::LookupFailed(err),
        }
    })
    .await;
    match outcome {
        Err(err) => storage_unavailable(err.into()),
        Ok(CreateUserOutcome::Exists) => error_response(
            StatusCode::CONFLICT,
            "conflict",
            format!("User '{}' already exists", handle),
        ),
        Ok(CreateUserOutcome::Created(user_id)) => {
            info!("{} created user {} as {}", session.handle, handle, role);
            (
                StatusCode::CREATED,
                Json(UserView {
                    user_id,
                    handle,
                    role,
                }),
            )
                .into_response()
        }
        Ok(CreateUserOutcome::Rejected(err)) => {
            error_response(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
        Ok(CreateUserOutcome::LookupFailed(err)) => {
            error!("Failed to look up user {}: {:#}", handle, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_users(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    State(config): State<ServerConfig>,
) -> Response {
    if !session.has_permission(Permission::ManageUsers) {
        return error_response(StatusCode::FORBIDDEN, "forbidden", "ManageUsers required");
    }
    let outcome = match run_with_timeout(config.store_timeout, move || user_manager.get_all_users())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return storage_unavailable(err),
    };
    match outcome {
        Ok(users) => Json(
            users
                .into_iter()
                .map(|actor| UserView {
                    user_id: actor.user_id,
                    handle: actor.handle,
                    role: actor.role,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => {
            error!("Failed to list users: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        user_manager: GuardedUserManager,
        workflow_engine: GuardedWorkflowEngine,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            user_manager,
            workflow_engine,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    user_manager: Arc<UserManager>,
    workflow_engine: Arc<WorkflowEngine>,
) -> Router {
    let state = ServerState::new(config, user_manager, workflow_engine);

    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/session", get(get_session))
        .with_state(state.clone());

    let admin_routes: Router = Router::new()
        .route("/users", post(create_user).get(list_users))
        .with_state(state.clone());

    let app: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/v1/auth", auth_routes)
        .nest("/v1/results", make_result_routes(state.clone()))
        .nest("/v1/admin", admin_routes);

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server(
    config: ServerConfig,
    user_manager: Arc<UserManager>,
    workflow_engine: Arc<WorkflowEngine>,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, user_manager, workflow_engine);

    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            error!("Metrics server stopped: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    Ok(axum::serve(listener, app).await?)
}
