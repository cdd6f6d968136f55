//! Logging setup (SPEC_FULL.md §6, §7 "ambient stack"). Replaces the
//! teacher's hand-rolled file logger with `tracing`/`tracing-subscriber`,
//! the stack the rest of the workspace already logs through. Idempotent:
//! safe to call once at process start, which is all the daemon needs.

use crate::args::LogLevel;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber writing to stderr. `RUST_LOG`
/// overrides `level` when set, matching the usual `tracing-subscriber`
/// convention.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
