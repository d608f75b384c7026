//! Log routing for the summarization service.
//!
//! Every event goes to stdout. A second copy goes to a file so a long summarization job can be
//! reviewed after the terminal is gone: `DOCBRIEF_LOG_FILE` names a file to append to, and
//! without it events land in a daily-rotated `logs/docbrief.log`. Budget waits, page progress
//! and embedding progress are emitted at `info`.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "DOCBRIEF_LOG_FILE";
const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "docbrief.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file copy of the log stream is written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogDestination {
    /// Append to an operator-chosen file.
    Append(PathBuf),
    /// Rotate daily under the local `logs` directory.
    DailyRotation,
}

impl LogDestination {
    fn resolve(explicit: Option<String>) -> Self {
        match explicit.map(|path| path.trim().to_string()) {
            Some(path) if !path.is_empty() => Self::Append(PathBuf::from(path)),
            _ => Self::DailyRotation,
        }
    }
}

/// Install the stdout and file subscribers.
///
/// `RUST_LOG` controls filtering and defaults to `info`. A second call leaves the first
/// subscriber in place and reports the conflict on stderr.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let destination = LogDestination::resolve(std::env::var(LOG_FILE_VAR).ok());
    let result = match open_writer(&destination) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

/// Open the file writer for `destination`; stdout logging continues alone when this fails.
fn open_writer(destination: &LogDestination) -> Option<NonBlocking> {
    let (writer, guard) = match destination {
        LogDestination::Append(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        LogDestination::DailyRotation => {
            std::fs::create_dir_all(LOG_DIR)
                .map_err(|err| eprintln!("Failed to create {LOG_DIR} directory: {err}"))
                .ok()?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(
                LOG_DIR,
                LOG_FILE_PREFIX,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}
