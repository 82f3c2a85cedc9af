use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::{LocalTime, UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::config_directory;

const LOG_ENV_VAR: &str = "DATAMALL_LOG";
const LOG_FILE_NAME: &str = "datamall.log";
const DEFAULT_DIRECTIVE: &str = "info";

/// Where log events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingDestination {
    /// JSON lines in `<config dir>/logs/datamall.log` plus readable lines on stderr.
    FileAndStderr,
    StderrOnly,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory: {0}")]
    Io(#[from] io::Error),
    #[error("invalid logging filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install logging subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

struct InstalledLogging {
    log_file: Option<PathBuf>,
    _flush: Option<WorkerGuard>,
}

static INSTALLED: OnceLock<InstalledLogging> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Directory holding the JSON log file.
pub fn log_directory() -> PathBuf {
    config_directory().join("logs")
}

/// Install the global subscriber and return the log file path, if any.
///
/// Only the first successful call installs anything; later calls report the existing file.
pub fn init_logging(destination: LoggingDestination) -> Result<Option<&'static Path>, LoggingError> {
    if INSTALLED.get().is_none() {
        let installed = install(destination)?;
        let _ = INSTALLED.set(installed);
    }
    Ok(current_log_path())
}

pub fn current_log_path() -> Option<&'static Path> {
    INSTALLED.get().and_then(|state| state.log_file.as_deref())
}

/// Filter directive: `DATAMALL_LOG`, then `RUST_LOG`, then `info`. Blank values are skipped.
pub fn filter_directive(datamall_log: Option<String>, rust_log: Option<String>) -> String {
    [datamall_log, rust_log]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

fn install(destination: LoggingDestination) -> Result<InstalledLogging, LoggingError> {
    let directive = filter_directive(env::var(LOG_ENV_VAR).ok(), env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(directive)?;

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer()];
    let (log_file, flush) = match destination {
        LoggingDestination::FileAndStderr => {
            let dir = log_directory();
            fs::create_dir_all(&dir)?;
            let (layer, guard) = json_file_layer(&dir);
            layers.push(layer);
            (Some(dir.join(LOG_FILE_NAME)), Some(guard))
        }
        LoggingDestination::StderrOnly => (None, None),
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    if let Some(path) = &log_file {
        info!(path = %path.display(), "writing JSON logs");
    }
    Ok(InstalledLogging {
        log_file,
        _flush: flush,
    })
}

fn stderr_layer() -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(false)
        .boxed()
}

fn json_file_layer(dir: &Path) -> (BoxedLayer, WorkerGuard) {
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE_NAME));
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .with_ansi(false)
        .boxed();
    (layer, guard)
}
