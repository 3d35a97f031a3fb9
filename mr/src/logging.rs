//! Tracing setup shared by the coordinator and worker binaries.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 1)
        .with_thread_ids(verbose >= 2)
        .init();
}
