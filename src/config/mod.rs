mod file_config;

pub use file_config::{FileConfig, GradingConfig};

use crate::results::ScoreBounds;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_METRICS_PORT: u16 = 9091;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_TOKEN_TTL_DAYS: u64 = 30;

/// CLI arguments that take part in config resolution.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub store_timeout_ms: u64,
    pub token_ttl_days: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            db_dir: None,
            port: DEFAULT_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            logging_level: RequestsLoggingLevel::Path,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub store_timeout: Duration,
    pub token_ttl: Duration,
    pub score_bounds: ScoreBounds,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let store_timeout_ms = file.store_timeout_ms.unwrap_or(cli.store_timeout_ms);
        if store_timeout_ms == 0 {
            bail!("store_timeout_ms must be positive");
        }
        let token_ttl_days = file.token_ttl_days.unwrap_or(cli.token_ttl_days);
        if token_ttl_days == 0 {
            bail!("token_ttl_days must be positive");
        }

        let grading = file.grading.unwrap_or_default();
        let defaults = ScoreBounds::default();
        let score_bounds = ScoreBounds {
            min: grading.min_score.unwrap_or(defaults.min),
            max: grading.max_score.unwrap_or(defaults.max),
        };
        if !(score_bounds.min < score_bounds.max) {
            bail!(
                "Invalid grading bounds: min_score {} must be below max_score {}",
                score_bounds.min,
                score_bounds.max
            );
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            store_timeout: Duration::from_millis(store_timeout_ms),
            token_ttl: Duration::from_secs(token_ttl_days * 24 * 60 * 60),
            score_bounds,
        })
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }

    pub fn results_db_path(&self) -> PathBuf {
        self.db_dir.join("results.db")
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
