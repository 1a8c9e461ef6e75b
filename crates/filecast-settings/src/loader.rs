//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FilecastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `FILECAST_*` environment variable overrides (highest priority)
//! 4. Validate ranges

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{
    FilecastSettings, MAX_MESSAGE_SIZE, MAX_WRITE_TIMEOUT_MS, MIN_MESSAGE_SIZE,
    MIN_WRITE_TIMEOUT_MS,
};

/// Env var overriding `server.host`.
pub const ENV_HOST: &str = "FILECAST_HOST";
/// Env var overriding `server.port`.
pub const ENV_PORT: &str = "FILECAST_PORT";
/// Env var overriding `server.writeTimeoutMs`.
pub const ENV_WRITE_TIMEOUT_MS: &str = "FILECAST_WRITE_TIMEOUT_MS";
/// Env var overriding `server.maxMessageSize`.
pub const ENV_MAX_MESSAGE_SIZE: &str = "FILECAST_MAX_MESSAGE_SIZE";
/// Env var overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "FILECAST_LOG_LEVEL";

/// Resolve the default settings file (`~/.filecast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".filecast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FilecastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. An unreadable file or invalid JSON is an
/// error, as is any value outside its allowed range.
pub fn load_settings_from_path(path: &Path) -> Result<FilecastSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

fn load_with<F>(path: &Path, lookup: F) -> Result<FilecastSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(FilecastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FilecastSettings = serde_json::from_value(merged)?;
    apply_overrides_with(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `FILECAST_*` environment variable overrides.
///
/// Invalid values are logged and ignored, leaving the file or default value.
pub fn apply_env_overrides(settings: &mut FilecastSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

fn apply_overrides_with<F>(settings: &mut FilecastSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = string(ENV_HOST) {
        settings.server.host = v;
    }
    if let Some(v) = string(ENV_PORT) {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = ENV_PORT, value = %v, "invalid u16 env var, ignoring"),
        }
    }
    if let Some(v) = string(ENV_WRITE_TIMEOUT_MS) {
        match parse_u64_range(&v, MIN_WRITE_TIMEOUT_MS, MAX_WRITE_TIMEOUT_MS) {
            Some(ms) => settings.server.write_timeout_ms = ms,
            None => {
                warn!(key = ENV_WRITE_TIMEOUT_MS, value = %v, "invalid u64 env var, ignoring");
            }
        }
    }
    if let Some(v) = string(ENV_MAX_MESSAGE_SIZE) {
        match parse_usize_range(&v, MIN_MESSAGE_SIZE, MAX_MESSAGE_SIZE) {
            Some(size) => settings.server.max_message_size = size,
            None => {
                warn!(key = ENV_MAX_MESSAGE_SIZE, value = %v, "invalid usize env var, ignoring");
            }
        }
    }
    if let Some(v) = string(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
