use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::errors::Result;

/// Timestamp naming the run's log file and archive. `%Y%m%dT%H%M%S`
/// sorts lexicographically in chronological order.
pub fn run_stamp(now: &chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y%m%dT%H%M%S").to_string()
}

/// Opens a fresh log file for this run and installs the global
/// subscriber: human-oriented stdout plus a plain-text file layer.
/// The returned guard must live until process exit or buffered log
/// lines are lost.
pub fn init_logging(log_dir: &Path, stamp: &str) -> Result<(PathBuf, WorkerGuard)> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(format!("{stamp}.log"));
    let log_file = fs::File::create(&log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stdout)
                .with_target(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(false)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    Ok((log_path, guard))
}
