use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "taskmate.log";

/// `RUST_LOG` wins when set; otherwise `-v` raises the level to debug.
pub fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "taskmate=debug" } else { "taskmate=info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn init_stderr(verbose: bool) -> anyhow::Result<()> {
    fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

/// Log to `<dir>/taskmate.log.YYYY-MM-DD`. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init_file(dir: &Path, verbose: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    fmt()
        .with_env_filter(filter(verbose))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(guard)
}
