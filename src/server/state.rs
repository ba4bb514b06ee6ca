//! Application state management

use crate::session::AnalysisSession;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    /// Uploads, transforms and clears take the write lock; everything else reads
    pub session: RwLock<AnalysisSession>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            session: RwLock::new(AnalysisSession::new()),
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }
}
