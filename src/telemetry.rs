//! Tracing initialization helpers.

use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global `tracing` subscriber with env-filter support.
///
/// Honors `RUST_LOG`; defaults to `info` when unset. Calling this more
/// than once is a no-op, which keeps it safe to use from tests and
/// binaries alike.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
