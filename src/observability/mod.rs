//! Structured logging setup for the binaries.
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! left to the binary, once, at startup.

pub mod config;

pub use config::{LogConfig, LogFormat, DEFAULT_LOG_FILTER};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// Fails if the filter directives don't parse or a subscriber is
/// already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    }
}
