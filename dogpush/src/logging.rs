use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::{prelude::*, registry};

/// Installs the global subscriber. Logs go to stderr so `dump` keeps stdout
/// for the payload; `RUST_LOG` overrides the `info` default.
pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter);

    // A subscriber may already be installed when embedded in tests.
    let _ = registry().with(fmt_layer).try_init();
}
