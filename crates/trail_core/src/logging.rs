//! Logging setup.
//!
//! Library code only emits `tracing` events. Binaries call `init` once;
//! `TRAIL_LOG` overrides the configured level with a full filter directive
//! (e.g. `TRAIL_LOG=trail_core::sync=debug`).

use crate::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "TRAIL_LOG";

/// Build the filter from `TRAIL_LOG`, falling back to the configured level
pub fn filter_for(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init(config: &LogConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(config))
        .with_target(false)
        .try_init()
        .is_ok()
}
