//! Logging bootstrap.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,ember=debug";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG` and falls back to [`DEFAULT_FILTER`]. Events carry
/// their target and the emitting thread id, which matters once validation
/// messages start arriving from driver threads.
///
/// Calling this more than once is harmless; later calls return `false`
/// and leave the first subscriber in place.
///
/// # Example
/// ```
/// ember_core::init_logging();
/// tracing::info!("frame loop starting");
/// ```
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .is_ok()
}
