//! Log filter and rolling file writer shared by binaries (feature `tracing-init`).

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

/// `<APP>_LOG_DIR` (e.g. `STEPFLOW_LOG_DIR`), if set and non-empty.
pub fn log_dir_from_env(app_name: &str) -> Option<PathBuf> {
    let key = format!("{}_LOG_DIR", app_name.to_uppercase().replace('-', "_"));
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Filter from `RUST_LOG`, else `default_directive` (e.g. `"warn"` or `"stepflow=debug"`).
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Daily-rolling non-blocking writer to `<dir>/<file_prefix>.YYYY-MM-DD`.
///
/// Keep the returned guard alive for the life of the process; dropping it flushes and stops
/// the writer thread.
pub fn rolling_file_writer(
    dir: &Path,
    file_prefix: &str,
) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, file_prefix);
    Ok(tracing_appender::non_blocking(appender))
}
