//! Logging setup shared by the trendtap binary and its integration tests.
//!
//! [`init_logging`] installs one global `tracing` subscriber that writes to a
//! daily rolling file and, optionally, to `stderr`. Only the first call
//! installs anything; later calls return the path resolved by the first.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Overrides the log directory when the config does not name one.
pub const LOG_DIR_ENV: &str = "TRENDTAP_LOG_DIR";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Output encoding for structured logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration passed to [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Used for the default directory and the file name prefix.
    pub app_name: &'static str,
    /// Explicit directory. `None` falls back to `TRENDTAP_LOG_DIR`, then
    /// `~/.local/share/<app_name>`.
    pub log_dir: Option<PathBuf>,
    pub emit_stderr: bool,
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "trendtap",
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Returns the log file written today.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let resolved_dir = resolve_log_dir(config.app_name, config.log_dir.as_deref());
    std::fs::create_dir_all(&resolved_dir)
        .with_context(|| format!("failed to create log directory: {}", resolved_dir.display()))?;

    let log_filename = format!("{}.log", config.app_name);
    let full_path = daily_log_path(&resolved_dir, &log_filename, Local::now().date_naive());

    let appender = rolling::daily(&resolved_dir, &log_filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .with_context(|| format!("invalid log filter: {}", config.default_filter))?;

    let installed = match (config.format, config.emit_stderr) {
        (LogFormat::Text, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init(),
        (LogFormat::Text, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Json, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        (LogFormat::Json, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(writer))
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    let _ = LOG_GUARD.set(guard);
    let _ = LOG_PATH.set(full_path.clone());
    Ok(full_path)
}

/// `rolling::daily` names files `<prefix>.<YYYY-MM-DD>`.
fn daily_log_path(dir: &Path, prefix: &str, day: NaiveDate) -> PathBuf {
    dir.join(format!("{prefix}.{}", day.format("%Y-%m-%d")))
}

fn resolve_log_dir(app_name: &str, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return expand_home(dir);
    }

    match std::env::var(LOG_DIR_ENV) {
        Ok(env_dir) if !env_dir.trim().is_empty() => expand_home(Path::new(&env_dir)),
        _ => default_data_dir(app_name),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

fn default_data_dir(app_name: &str) -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share").join(app_name),
        Err(_) => PathBuf::from(".").join(app_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins_and_expands_home() {
        temp_env::with_vars(
            [("HOME", Some("/home/tt")), (LOG_DIR_ENV, Some("/var/log/tt"))],
            || {
                assert_eq!(
                    resolve_log_dir("trendtap", Some(Path::new("~/logs"))),
                    PathBuf::from("/home/tt/logs")
                );
                assert_eq!(
                    resolve_log_dir("trendtap", Some(Path::new("/srv/logs"))),
                    PathBuf::from("/srv/logs")
                );
            },
        );
    }

    #[test]
    fn env_dir_then_data_dir() {
        temp_env::with_vars(
            [("HOME", Some("/home/tt")), (LOG_DIR_ENV, Some("/var/log/tt"))],
            || assert_eq!(resolve_log_dir("trendtap", None), PathBuf::from("/var/log/tt")),
        );
        temp_env::with_vars([("HOME", Some("/home/tt")), (LOG_DIR_ENV, None)], || {
            assert_eq!(
                resolve_log_dir("trendtap", None),
                PathBuf::from("/home/tt/.local/share/trendtap")
            )
        });
    }

    #[test]
    fn daily_file_name_matches_appender() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            daily_log_path(Path::new("/tmp/tt"), "trendtap.log", day),
            PathBuf::from("/tmp/tt/trendtap.log.2024-03-09")
        );
    }

    #[test]
    fn log_format_reads_lowercase() {
        let f: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(f, LogFormat::Json);
        assert!(serde_json::from_str::<LogFormat>("\"xml\"").is_err());
    }
}
