//! Tracing bootstrap for the binary.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "docbridge.log";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. With a log
/// directory configured, output goes to a daily-rolling file through a
/// non-blocking writer; the returned guard must be held until exit or
/// buffered lines are lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log level '{}': {}", config.level, e))?;

  match &config.directory {
    Some(directory) => {
      std::fs::create_dir_all(directory).map_err(|e| {
        eyre!(
          "Failed to create log directory {}: {}",
          directory.display(),
          e
        )
      })?;
      let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;
      Ok(None)
    }
  }
}
