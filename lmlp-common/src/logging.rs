//! Tracing initialization
//!
//! Shared subscriber setup so library consumers and integration tests get
//! identical log formatting. `RUST_LOG` takes precedence over the default
//! filter.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `default_filter` is used when `RUST_LOG` is unset, e.g. `"info"` or
/// `"lmlp_ingest=debug"`. Safe to call more than once; subsequent calls are
/// no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
