use anyhow::{anyhow, Result};
use std::io::IsTerminal;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log files above this size are discarded on startup.
const MAX_LOG_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// Install the global subscriber.
///
/// Logs go to `log_file` if given, to stderr otherwise. `RUST_LOG` takes
/// precedence over `max_level`. The returned guard must be kept alive for
/// file logging to be flushed.
pub fn init(log_file: Option<&Path>, max_level: &str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(max_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .try_init()
            .map_err(|err| anyhow!(err))?;
        return Ok(None);
    };

    if let Ok(metadata) = std::fs::metadata(log_path) {
        if log_path.is_file() && metadata.len() > MAX_LOG_FILE_SIZE {
            std::fs::remove_file(log_path)?;
        }
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {log_path:?}"))?;

    let directory = log_path
        .parent()
        .ok_or_else(|| anyhow!("{log_path:?} has no parent"))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_line_number(true)
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(Some(guard))
}
