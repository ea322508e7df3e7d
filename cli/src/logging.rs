//! Tracing setup for the binary: stderr layer plus an optional daily log file.
//!
//! Filter: `RUST_LOG`, else `warn` (`stepflow=debug` with `--verbose`). When
//! `STEPFLOW_LOG_DIR` is set, every line also goes to `<dir>/stepflow.log.YYYY-MM-DD`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::log_format::TextWithSpanPath;

/// Keeps the file writer alive; drop it at the end of `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(verbose: bool) -> LogGuard {
    let default = if verbose { "warn,stepflow=debug,cli=debug" } else { "warn" };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(config::tracing_init::env_filter(default));

    let mut file_guard = None;
    let file_layer = config::tracing_init::log_dir_from_env("stepflow").and_then(|dir| {
        match config::tracing_init::rolling_file_writer(&dir, "stepflow.log") {
            Ok((writer, guard)) => {
                file_guard = Some(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .event_format(TextWithSpanPath::new())
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(config::tracing_init::env_filter("info")),
                )
            }
            Err(e) => {
                eprintln!("warning: cannot open log dir {}: {}", dir.display(), e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    LogGuard { _file: file_guard }
}
