//! # Logging
//!
//! Console tracing initialization, guarded so embedding tests and the CLI
//! can both call it safely.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber once. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_err()
        {
            // A global subscriber is already set (e.g. a test harness);
            // keep using it.
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}
