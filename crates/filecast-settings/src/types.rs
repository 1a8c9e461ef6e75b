//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`, so
//! a partial file only overrides the keys it names.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Smallest accepted per-write timeout, in milliseconds.
pub const MIN_WRITE_TIMEOUT_MS: u64 = 1;
/// Largest accepted per-write timeout, in milliseconds.
pub const MAX_WRITE_TIMEOUT_MS: u64 = 600_000;
/// Smallest accepted inbound frame limit.
pub const MIN_MESSAGE_SIZE: usize = 1024;
/// Largest accepted inbound frame limit.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024;

/// Root settings for the relay.
///
/// ```json
/// {
///   "server": { "port": 9000, "writeTimeoutMs": 2000 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilecastSettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl FilecastSettings {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        if !(MIN_WRITE_TIMEOUT_MS..=MAX_WRITE_TIMEOUT_MS).contains(&self.server.write_timeout_ms) {
            return Err(SettingsError::InvalidValue(format!(
                "server.writeTimeoutMs must be within {MIN_WRITE_TIMEOUT_MS}..={MAX_WRITE_TIMEOUT_MS}, got {}",
                self.server.write_timeout_ms
            )));
        }
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&self.server.max_message_size) {
            return Err(SettingsError::InvalidValue(format!(
                "server.maxMessageSize must be within {MIN_MESSAGE_SIZE}..={MAX_MESSAGE_SIZE}, got {}",
                self.server.max_message_size
            )));
        }
        Ok(())
    }
}

/// Listener and transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// TCP port to bind. `0` picks a free port.
    pub port: u16,
    /// Upper bound on a single outbound write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Largest inbound WebSocket frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            write_timeout_ms: 10_000,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
