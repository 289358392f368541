//! Structured logging initialization.
//!
//! The teacher exports full OpenTelemetry traces and metrics; this validator
//! has no user-facing API and nothing downstream to scrape OTLP, so only the
//! structured-logging half of that stack is carried over, configured the
//! same way via `RUST_LOG`/`EnvFilter`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. `RUST_LOG` controls verbosity;
/// defaults to `info` when unset or unparsable.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
