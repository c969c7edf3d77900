use serde::{Deserialize, Serialize};

use crate::store::Limits;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub limits: Limits,
    pub sync: SyncConfig,
    pub route: RouteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            limits: Limits::default(),
            sync: SyncConfig::default(),
            route: RouteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
        }
    }
}

/// Dispatcher tuning: backoff shape, attempt cap, transport timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Attempts before the store status reports the queue as stalled.
    pub max_attempts: u32,
    /// Bound every transport send; a timeout is a retriable failure.
    pub send_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 250,
            backoff_max_ms: 30_000,
            max_attempts: 6,
            send_timeout_ms: 10_000,
        }
    }
}

/// Route-planning defaults for a field day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub working_minutes: u32,
    pub travel_speed_kmh: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            working_minutes: 480,
            travel_speed_kmh: 30.0,
        }
    }
}
