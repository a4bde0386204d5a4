use super::RequestsLoggingLevel;
use std::time::Duration;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub metrics_port: u16,
    /// Upper bound for a single store call made on behalf of a request.
    pub store_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            metrics_port: 9091,
            store_timeout: Duration::from_secs(2),
        }
    }
}
