use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "cmms_offline=info";
const LOG_FILE_PREFIX: &str = "cmms-offline.log";

/// Default log directory ($XDG_DATA_HOME/cmms-offline/logs)
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("cmms-offline").join("logs"))
}

/// Install the global subscriber: stderr plus a daily rolling file in
/// `log_dir` when one is given. Keep the guard alive until exit so buffered
/// lines are flushed.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(file_layer)
    .init();

  guard
}
