//! Process-wide `tracing` subscriber.
//!
//! Logs always go to stderr; stdout is reserved for command output.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    #[default]
    Default,
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),
    #[error("failed to init logger: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` wins over `level` when set.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::from_str(level)?),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(level: &str, mode: LogMode) -> Result<(), LoggingError> {
    let filter = env_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter);

    match mode {
        LogMode::Default => builder.finish().try_init()?,
        LogMode::Json => builder.json().finish().try_init()?,
        LogMode::Pretty => builder
            .pretty()
            .with_line_number(true)
            .with_file(true)
            .finish()
            .try_init()?,
        LogMode::Compact => builder.compact().finish().try_init()?,
    }

    Ok(())
}
