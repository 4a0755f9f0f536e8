//! Structured logging configuration.
//!
//! The server logs through `tracing`. The ledger library logs through the
//! `log` facade; those records are forwarded into the same subscriber.
//!
//! Events always go to the console. With a log directory configured they are
//! also split by severity into rolling files:
//!
//! | File                    | Events                         |
//! |-------------------------|--------------------------------|
//! | `wallet_warning.log`    | `WARN`                         |
//! | `wallet_error.log`      | `ERROR`, panics excluded       |
//! | `wallet_exception.log`  | panics (target [`PANIC_TARGET`]) |
//! | `wallet_general.log`    | `INFO` and more verbose        |

use std::path::Path;

use tracing::{Level, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, filter::filter_fn, fmt, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogRotation, LoggingConfig};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Target of events emitted by the panic hook
pub const PANIC_TARGET: &str = "panic";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Logging setup failure
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Cannot create log directory: {0}")]
    Directory(#[from] std::io::Error),
    #[error("Cannot open log file: {0}")]
    Appender(#[from] InitError),
}

/// Keeps the background log writers alive
///
/// Dropping it flushes and closes the log files, so hold it for the life of
/// the process.
#[must_use]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use wallet_server::{config::LoggingConfig, logging};
///
/// #[tokio::main]
/// async fn main() {
///     let _guards = logging::init(&LoggingConfig::default()).unwrap();
///     tracing::info!("Server starting");
/// }
/// ```
///
/// # Errors
///
/// Returns error if the log directory or a log file cannot be created
pub fn init(config: &LoggingConfig) -> Result<LogGuards, LoggingError> {
    let (file_layers, guards) = match &config.log_dir {
        Some(dir) => file_layers(dir, config.rotation)?,
        None => (Vec::new(), Vec::new()),
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layers)
        .with(console_layer)
        .init();

    install_panic_hook();

    match &config.log_dir {
        Some(dir) => tracing::info!(log_dir = %dir.display(), "Structured logging initialized"),
        None => tracing::info!("Structured logging initialized"),
    }

    Ok(LogGuards { _guards: guards })
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn is_warning(meta: &Metadata<'_>) -> bool {
    *meta.level() == Level::WARN
}

fn is_error(meta: &Metadata<'_>) -> bool {
    *meta.level() == Level::ERROR && meta.target() != PANIC_TARGET
}

fn is_exception(meta: &Metadata<'_>) -> bool {
    meta.target() == PANIC_TARGET
}

fn is_general(meta: &Metadata<'_>) -> bool {
    *meta.level() > Level::WARN
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
    }
}

/// One non-blocking, severity-filtered file layer per log file
fn file_layers<S>(
    dir: &Path,
    period: LogRotation,
) -> Result<(Vec<BoxedLayer<S>>, Vec<WorkerGuard>), LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;

    let sinks: [(&str, fn(&Metadata<'_>) -> bool); 4] = [
        ("warning", is_warning),
        ("error", is_error),
        ("exception", is_exception),
        ("general", is_general),
    ];

    let mut layers = Vec::with_capacity(sinks.len());
    let mut guards = Vec::with_capacity(sinks.len());
    for (name, keep) in sinks {
        let appender = RollingFileAppender::builder()
            .rotation(rotation(period))
            .filename_prefix(format!("wallet_{name}"))
            .filename_suffix("log")
            .build(dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true)
            .with_filter(filter_fn(keep))
            .boxed();

        layers.push(layer);
        guards.push(guard);
    }

    Ok((layers, guards))
}

/// Report panics through tracing before the default hook runs
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(target: PANIC_TARGET, location = %location, "{info}");
        previous(info);
    }));
}

/// Log a wallet store startup step with its timing
///
/// Slow steps (over one second) are reported as warnings.
pub fn log_startup_step(step: &str, duration_ms: u64) {
    if duration_ms > 1000 {
        tracing::warn!(step = step, duration_ms = duration_ms, "Slow startup step");
    } else {
        tracing::info!(step = step, duration_ms = duration_ms, "Startup step completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tracing_subscriber::Registry;

    fn temp_log_dir() -> PathBuf {
        std::env::temp_dir().join(format!("wallet_logs_{}", uuid::Uuid::new_v4()))
    }

    fn read_log(dir: &Path, name: &str) -> String {
        std::fs::read_to_string(dir.join(format!("wallet_{name}.log"))).unwrap()
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_log_startup_step() {
        // Just ensure it doesn't panic
        log_startup_step("connect", 20);
        log_startup_step("migrate", 2500);
    }

    #[test]
    fn test_events_split_by_severity() {
        let dir = temp_log_dir();
        let (layers, guards) = file_layers::<Registry>(&dir, LogRotation::Never).unwrap();
        let subscriber = tracing_subscriber::registry().with(layers);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("deposit applied");
            tracing::warn!("insufficient funds");
            tracing::error!("store unavailable");
            tracing::error!(target: PANIC_TARGET, "handler panicked");
        });
        // Flushes the background writers
        drop(guards);

        let general = read_log(&dir, "general");
        assert!(general.contains("deposit applied"));
        assert!(!general.contains("insufficient funds"));

        let warning = read_log(&dir, "warning");
        assert!(warning.contains("insufficient funds"));
        assert!(!warning.contains("store unavailable"));

        let error = read_log(&dir, "error");
        assert!(error.contains("store unavailable"));
        assert!(!error.contains("handler panicked"));

        let exception = read_log(&dir, "exception");
        assert!(exception.contains("handler panicked"));
        assert!(!exception.contains("store unavailable"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_log_dir_is_created() {
        let dir = temp_log_dir().join("nested");
        let (_layers, _guards) = file_layers::<Registry>(&dir, LogRotation::Daily).unwrap();
        assert!(dir.is_dir());

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }
}
