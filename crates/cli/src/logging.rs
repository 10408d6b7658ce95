//! Logging utilities for CLI commands and the daemon

use std::path::PathBuf;

use lodestone_core::DaemonConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Directory for daemon log files
pub fn log_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("lodestone")
}

/// Initialize logging for one-shot CLI commands (console only)
pub fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

/// Parse log level from config string
fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Initialize logging for the daemon with config-driven settings.
///
/// In foreground mode: console only with colors.
/// In background mode: rolling file only (no ANSI).
///
/// Returns the guard that must be kept alive for the duration of the program.
pub fn init_daemon_logging(config: &DaemonConfig, foreground: bool) -> Option<WorkerGuard> {
  let level = parse_log_level(&config.log_level);

  // Build env filter (allows RUST_LOG override)
  let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

  if foreground {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(true)
      .init();
    None
  } else {
    let log_dir = log_dir();
    if std::fs::create_dir_all(&log_dir).is_err() {
      // Fall back to console-only logging
      init_cli_logging();
      return None;
    }

    let file_appender = match config.log_rotation.as_str() {
      "hourly" => tracing_appender::rolling::hourly(&log_dir, "lodestone.log"),
      "never" => tracing_appender::rolling::never(&log_dir, "lodestone.log"),
      _ => tracing_appender::rolling::daily(&log_dir, "lodestone.log"),
    };

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(false)
      .with_writer(file_writer)
      .init();

    Some(guard)
  }
}
