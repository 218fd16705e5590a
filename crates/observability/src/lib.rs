//! Tracing/logging setup shared by the binaries.

/// Initialize process-wide observability (tracing/logging).
///
/// `level` is the configured default filter. This is safe to call multiple
/// times; subsequent calls become no-ops.
pub fn init(level: &str) {
    tracing::init(level);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
