use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use srms_server::config::{
    AppConfig, CliConfig, FileConfig, DEFAULT_METRICS_PORT, DEFAULT_PORT,
    DEFAULT_STORE_TIMEOUT_MS, DEFAULT_TOKEN_TTL_DAYS,
};
use srms_server::results::{SqliteResultStore, WorkflowEngine};
use srms_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use srms_server::user::{SqliteUserStore, UserManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding user.db and results.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Upper bound in milliseconds for a single store call.
    #[clap(long, default_value_t = DEFAULT_STORE_TIMEOUT_MS)]
    pub store_timeout_ms: u64,

    /// Session tokens older than this are rejected.
    #[clap(long, default_value_t = DEFAULT_TOKEN_TTL_DAYS)]
    pub token_ttl_days: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            store_timeout_ms: self.store_timeout_ms,
            token_ttl_days: self.token_ttl_days,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening user database at {:?}...", config.user_db_path());
    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);
    let user_manager = Arc::new(UserManager::new(user_store, config.token_ttl));

    info!("Opening results database at {:?}...", config.results_db_path());
    let result_store = SqliteResultStore::new(
        config.results_db_path(),
        config.score_bounds,
        config.store_timeout,
    )?;
    let workflow_engine = Arc::new(WorkflowEngine::new(Arc::new(result_store)));

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    run_server(
        ServerConfig {
            requests_logging_level: config.logging_level,
            port: config.port,
            metrics_port: config.metrics_port,
            store_timeout: config.store_timeout,
        },
        user_manager,
        workflow_engine,
    )
    .await
}
