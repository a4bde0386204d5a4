//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own user and results databases.

use super::constants::*;
use super::fixtures::create_test_db_with_users;
use srms_server::results::{ScoreBounds, SqliteResultStore, WorkflowEngine};
use srms_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use srms_server::user::{SqliteUserStore, UserManager, DEFAULT_TOKEN_TTL};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// A running server on a random local port.
///
/// When dropped, the server shuts down gracefully and its temp dir is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    pub port: u16,
    /// Direct access to the user database, for arranging test state.
    pub user_manager: Arc<UserManager>,

    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server with the default store timeout.
    pub async fn spawn() -> Self {
        Self::spawn_with_store_timeout(Duration::from_secs(2)).await
    }

    /// Spawns a server on 127.0.0.1:0 and waits until it answers on `/`.
    ///
    /// # Panics
    ///
    /// Panics if fixtures can't be created, the port can't be bound, or the
    /// server doesn't become ready within [`SERVER_READY_TIMEOUT_MS`].
    pub async fn spawn_with_store_timeout(store_timeout: Duration) -> Self {
        let (temp_db_dir, user_db_path) =
            create_test_db_with_users().expect("Failed to create test database");

        let user_store =
            Arc::new(SqliteUserStore::new(&user_db_path).expect("Failed to open user store"));
        let user_manager = Arc::new(UserManager::new(user_store, DEFAULT_TOKEN_TTL));

        let results_db_path = temp_db_dir.path().join("results.db");
        let result_store = SqliteResultStore::new(
            &results_db_path,
            ScoreBounds::default(),
            Duration::from_secs(5),
        )
        .expect("Failed to open result store");
        let workflow_engine = Arc::new(WorkflowEngine::new(Arc::new(result_store)));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            metrics_port: 0,
            store_timeout,
        };
        let app = make_app(config, user_manager.clone(), workflow_engine);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            user_manager,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if let Ok(response) = client.get(format!("{}/", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "Server at {} not ready after {}ms",
                    self.base_url, SERVER_READY_TIMEOUT_MS
                );
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
