//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used as the filter
/// directive. Later calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
