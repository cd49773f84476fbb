//! Tracing setup: human-readable stderr plus a daily JSON log file.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Map `-v` / `-q` flags to a filter directive.
pub fn filter_for(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Default directory for JSON logs.
pub fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "toolbox", "toolbox")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `filter` for stderr. The file layer always logs at
/// `debug`. Keep the returned guard alive for the life of the process or
/// buffered file output is lost.
pub fn init(filter: &str, log_dir: Option<&Path>) -> WorkerGuard {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "toolbox.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for() {
        assert_eq!(filter_for(0, true), "error");
        assert_eq!(filter_for(0, false), "info");
        assert_eq!(filter_for(1, true), "debug");
        assert_eq!(filter_for(3, false), "trace");
    }
}
