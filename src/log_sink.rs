// log_sink.rs - Installs the process-wide tracing subscriber

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_level`. Later calls are no-ops; returns whether this call (or
/// the first one) managed to install the subscriber.
pub fn init_logging(default_level: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
}
