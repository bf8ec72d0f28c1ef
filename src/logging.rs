use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Stderr ceiling. While the terminal progress line is drawn, only warnings
/// and errors reach stderr; the log file still gets everything.
fn stderr_level(progress_line: bool) -> LevelFilter {
    if progress_line {
        LevelFilter::WARN
    } else {
        LevelFilter::TRACE
    }
}

/// Log to stderr and append to `log_file`. Keep the returned guard alive for
/// the whole run or buffered lines are lost on exit.
pub fn initialize_logging(log_file: &Path, progress_line: bool) -> Result<WorkerGuard> {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = log_file
        .file_name()
        .context("Log file path has no file name")?;
    fs::create_dir_all(dir).context("Failed to create log directory")?;

    // Rotation::NEVER with a prefix only: the file name is used verbatim and
    // opened in append mode.
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy().into_owned())
        .build(dir)
        .context("Failed to open log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(stderr_level(progress_line)),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_thread_names(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
