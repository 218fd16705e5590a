//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the configured level parses.
pub const FALLBACK_LEVEL: &str = "info";

/// Build the filter: `RUST_LOG` wins over the configured `level`.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(level: &str) {
    // JSON logs + timestamps.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
