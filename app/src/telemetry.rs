use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::TelemetryConfig;

/// Initializes the global `tracing` subscriber from the configured filter directive (e.g.
/// `"info"`, `"agent=debug,service=info"`), falling back to `RUST_LOG` if set.
pub fn initialize(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
