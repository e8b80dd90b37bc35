//! Logging setup for the bridge binary.

use clap::ValueEnum;
use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, filter::ParseError, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
    #[error("Unable to install subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Build the filter. `env` (the `RUST_LOG` value) wins over `level`.
fn filter(env: Option<&str>, level: &str) -> Result<EnvFilter, LoggingError> {
    Ok(EnvFilter::try_new(env.unwrap_or(level))?)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter(env.as_deref().filter(|v| !v.is_empty()), level)?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(false)).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }
    Ok(())
}
