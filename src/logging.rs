//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. explicit filter string passed by the embedding application
//! 2. `DELVER_LOG` environment variable (e.g. "info", "delver=debug")
//! 3. default to `info`

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the default log filter.
pub const LOG_ENV_VAR: &str = "DELVER_LOG";

/// Initialise the global logging subscriber.
///
/// Returns `false` if a subscriber was already installed (e.g. by the
/// embedding application or a previous test), which is harmless.
pub fn init_logging(filter: Option<&str>) -> bool {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
