//! Logging initialization for embedders.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the host application's decision. This helper sets up a plain console
//! subscriber filtered through the `RUST_LOG` environment variable for
//! hosts that have no subscriber of their own.

use tracing_subscriber::EnvFilter;

/// Initialize a console tracing subscriber.
///
/// Defaults to `info` level when `RUST_LOG` is not set. Safe to call once
/// per process; returns `false` if a global subscriber was already
/// installed.
pub fn init_logging() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .is_ok()
}
