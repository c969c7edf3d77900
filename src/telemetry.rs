//! Tracing subscriber setup.
//!
//! Call `init` once at process start; embedding applications that install
//! their own subscriber can skip it entirely (every log site uses plain
//! `tracing` macros and works under any subscriber).

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

use crate::config::{LogFormat, LoggingConfig};

const DEFAULT_FILTER: &str = "info,fieldsync=debug";

/// Install the global subscriber per `LoggingConfig`.
///
/// A second call is a no-op (the first subscriber wins), so tests and
/// embedders can call it freely.
pub fn init(config: &LoggingConfig) {
    if !config.stdout {
        return;
    }

    let filter = env_filter(config.filter.as_deref());

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.stdout_format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    // Err means a subscriber is already installed; that one wins.
    let _ = result;
}

fn env_filter(configured: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if let Some(directives) = configured
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    EnvFilter::new(DEFAULT_FILTER)
}
