//! Logging setup

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .trim()
        .parse()
        .with_context(|| format!("Invalid log level '{level}'"))?;

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    Ok(())
}

/// Same as [`init_logging`] but emits JSON lines.
pub fn init_json_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .trim()
        .parse()
        .with_context(|| format!("Invalid log level '{level}'"))?;

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init();

    Ok(())
}
