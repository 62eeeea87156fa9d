//! Process initialization shared by binaries and integration tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with the configured level.
///
/// `RUST_LOG` overrides the configured level when set, so operators can
/// raise verbosity per module without touching service config.
pub fn init_tracing(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
