//! Global tracing subscriber setup
use crate::config::LogConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let layer = fmt::layer()
            .json()
            .with_target(true) // keep target for structured queries
            .with_ansi(false);
        registry.with(layer).try_init()?;
    } else {
        let layer = fmt::layer().with_target(false);
        registry.with(layer).try_init()?;
    }

    Ok(())
}

