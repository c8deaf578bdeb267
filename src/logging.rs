//! `tracing` subscriber setup.
//!
//! The filter comes from `PULSE_LOG`, then `RUST_LOG`, then a default of
//! `warn` (`pulse=debug` with `--verbose`). Output goes to stderr, or to a
//! daily-rotated file when `[logging] file` is set, as text or JSON.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{LogFormat, LoggingSection};

pub const LOG_ENV_VAR: &str = "PULSE_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "warn,pulse=debug";

/// Pick the filter directive. Environment wins over `--verbose`.
fn filter_directive<F>(verbose: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [LOG_ENV_VAR, "RUST_LOG"]
        .iter()
        .find_map(|key| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or_else(|| {
            if verbose {
                VERBOSE_DIRECTIVE.to_string()
            } else {
                DEFAULT_DIRECTIVE.to_string()
            }
        })
}

pub fn env_filter(verbose: bool) -> EnvFilter {
    let directive = filter_directive(verbose, |key| std::env::var(key).ok());
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log filter '{}': {}", directive, err);
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

/// Install the global subscriber.
///
/// Returns the appender guard when logging to a file; keep it alive until
/// exit or buffered lines are lost. Returns `None` if a subscriber was
/// already installed.
pub fn init(verbose: bool, config: &LoggingSection) -> Option<WorkerGuard> {
    let (writer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let prefix = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("pulse.log");
            let appender = tracing_appender::rolling::daily(dir, prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(writer)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(config.file.is_none()).try_init(),
    };
    installed.ok()?;
    guard
}
