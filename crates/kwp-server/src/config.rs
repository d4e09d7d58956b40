//! Server Configuration

use std::time::Duration;

/// Server configuration, sourced from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds on
    pub bind_addr: String,

    /// Path of the ledger database file
    pub db_path: String,

    /// Notification outbox polling interval
    pub outbox_poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            db_path: "kwp_ledger.redb".into(),
            outbox_poll_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("KWP_DB_PATH").unwrap_or(defaults.db_path),
            outbox_poll_interval: std::env::var("OUTBOX_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.outbox_poll_interval, Duration::from_secs),
        }
    }
}
