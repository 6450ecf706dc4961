//! Logging and tracing configuration
//!
//! Interactive runs log to stderr. Long unattended campaigns can also keep a
//! plain-text log file next to the per-pipeline logs.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("diagrunner=info,warn"))
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Directory for `runner.log`: `dir` if given, else the data directory
pub fn resolve_log_dir(dir: Option<&Path>) -> Option<PathBuf> {
    match dir {
        Some(d) => Some(d.to_path_buf()),
        None => paths::log_dir(),
    }
}

/// Initialize tracing to stderr and to `runner.log` in `dir`
///
/// Falls back to the data directory from [`paths::log_dir`] when `dir` is
/// `None`, and to stderr only when there is no data directory either. The
/// returned guard must be held until exit so buffered lines are flushed.
pub fn init_with_file(dir: Option<&Path>) -> Option<WorkerGuard> {
    let Some(log_dir) = resolve_log_dir(dir) else {
        init_cli();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        init_cli();
        return None;
    }

    let appender = tracing_appender::rolling::never(&log_dir, "runner.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Some(guard)
}
