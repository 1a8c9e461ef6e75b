//! Server configuration.

use std::time::Duration;

use filecast_settings::ServerSettings;

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Upper bound on one write to one client during a broadcast.
    pub write_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            write_timeout: Duration::from_secs(10),
            max_message_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            write_timeout: Duration::from_millis(settings.write_timeout_ms),
            max_message_size: settings.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` string passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
