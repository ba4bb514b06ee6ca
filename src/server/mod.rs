//! quantlab HTTP server
//!
//! JSON API over a single [`AnalysisSession`](crate::session::AnalysisSession):
//! upload a table, transform columns, compute statistics and correlations,
//! fit models and run the financial analytics. Everything lives under `/api`.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_MAX_UPLOAD: usize = 50 * 1024 * 1024;
const DEFAULT_PREVIEW_ROWS: usize = 50;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_size: usize,
    /// Rows included in dataset descriptions
    pub preview_rows: usize,
    /// Allowed origin; `None` allows any
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_size: DEFAULT_MAX_UPLOAD,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            cors_origin: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `API_HOST`, `API_PORT`, `MAX_UPLOAD_SIZE`,
    /// `PREVIEW_ROWS` and `CORS_ORIGIN`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size),
            preview_rows: env_parse("PREVIEW_ROWS").unwrap_or(defaults.preview_rows),
            cors_origin: std::env::var("CORS_ORIGIN")
                .ok()
                .filter(|o| !o.is_empty() && o != "*"),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let state = Arc::new(AppState::new(config.clone()));
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        host = %config.host,
        port = config.port,
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        preview_rows = config.preview_rows,
        started_at = %start_time.to_rfc3339(),
        "quantlab server starting"
    );
    info!(url = %format!("http://{}/api", addr), "REST API available");
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not install ctrl+c handler, running until killed");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_upload_size, 50 * 1024 * 1024);
        assert_eq!(config.preview_rows, 50);
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::default().with_host("127.0.0.1").with_port(9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
    }
}
