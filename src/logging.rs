//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. When a log file is
/// configured the returned guard flushes the background writer on drop, so
/// keep it alive until the process exits.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("crymnet={}", config.level)));

  let (writer, guard) = match &config.file {
    Some(path) => {
      let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;

      std::fs::create_dir_all(&directory)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

      let appender = tracing_appender::rolling::never(&directory, file_name);
      let (non_blocking, guard) = tracing_appender::non_blocking(appender);
      (BoxMakeWriter::new(non_blocking), Some(guard))
    }
    None => (BoxMakeWriter::new(std::io::stderr), None),
  };

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer);

  let installed = match config.format {
    LogFormat::Json => builder.json().try_init(),
    LogFormat::Compact => builder.compact().try_init(),
    LogFormat::Human => builder.try_init(),
  };
  installed.map_err(|e| eyre!("Failed to initialise logging: {}", e))?;

  Ok(guard)
}
