//! Logging system setup and configuration
//!
//! Installs the process-wide `tracing` subscriber. The core never does this
//! itself; it only emits spans and events.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the logging system
///
/// Sets up structured logging with an environment-aware filter and either
/// human-readable or JSON output.
///
/// # Arguments
/// * `settings` - Level and output format from the `[logging]` section
///
/// # Returns
/// * `Result<()>` - Error if a global subscriber is already installed
///
/// # Environment Variables
/// * `RUST_LOG` - Overrides the configured level (e.g. "debug",
///   "arena_core=trace")
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}
