//! Logging initialization.
//!
//! Two sinks share one `tracing` registry:
//! - the console (stderr; stdout is reserved for caption records), filtered
//!   by `RUST_LOG` or the configured level, human-readable or JSON
//! - a persistent log file (`VQA.log` by default) that keeps DEBUG and above
//!   from this program's own crates, never ANSI-colored

use std::path::Path;

use anyhow::Context;
use glimpse_core::config::LoggingConfig;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Directives for the log file: debug for our crates, warnings from dependencies.
const FILE_DIRECTIVES: &str = "warn,glimpse=debug,glimpse_core=debug";

/// Install the global subscriber.
///
/// The returned guard flushes the file sink on drop; keep it alive for the
/// whole process.
pub fn init(config: &LoggingConfig, verbose: bool, json_logs: bool) -> anyhow::Result<WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level(config, verbose)));
    let json = json_logs || config.format == "json";
    let console = console_layer(console_filter, json, true, std::io::stderr);

    let (writer, guard) = tracing_appender::non_blocking(file_appender(&config.file)?);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer(writer))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

/// Human-readable or JSON console output. Every line names its target.
fn console_layer<S, W>(
    filter: EnvFilter,
    json: bool,
    ansi: bool,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_filter(filter)
            .boxed()
    }
}

/// Plain-text file output: timestamp, level, target, message.
fn file_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES))
}

/// Console level: `--verbose` wins, then the configured level.
fn console_level(config: &LoggingConfig, verbose: bool) -> &str {
    if verbose {
        "debug"
    } else {
        &config.level
    }
}

/// A non-rotating appender writing to `path`.
fn file_appender(path: &Path) -> anyhow::Result<RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("Cannot open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(console_level(&config, false), "warn");
        assert_eq!(console_level(&config, true), "debug");
    }

    #[test]
    fn test_file_appender_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("VQA.log");
        file_appender(&path).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_sink_keeps_debug_from_own_crates_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VQA.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender(&path).unwrap());

        let subscriber = tracing_subscriber::registry().with(file_layer(writer));
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "glimpse_core", "engine details");
            tracing::debug!(target: "ort", "session internals");
            tracing::warn!(target: "ort", "provider fallback");
        });
        drop(guard);

        let log = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2, "unexpected log contents: {log}");
        assert!(lines[0].contains("DEBUG glimpse_core: engine details"));
        assert!(lines[1].contains("WARN ort: provider fallback"));
        assert!(!log.contains("session internals"));
        assert!(lines.iter().all(|l| l.starts_with(|c: char| c.is_ascii_digit())));
        assert!(!log.contains('\x1b'));
    }

    #[test]
    fn test_console_sink_starts_at_info_with_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.txt");
        let sink = std::sync::Mutex::new(std::fs::File::create(&path).unwrap());

        let filter = EnvFilter::new(console_level(&LoggingConfig::default(), false));
        let subscriber =
            tracing_subscriber::registry().with(console_layer(filter, false, false, sink));
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "glimpse::cli", "hidden detail");
            tracing::info!(target: "glimpse::cli", "captioned 3 images");
        });

        let output = std::fs::read_to_string(&path).unwrap();
        assert!(output.contains("INFO glimpse::cli: captioned 3 images"));
        assert!(!output.contains("hidden detail"));
    }

    #[test]
    fn test_file_appender_rejects_dir_path() {
        assert!(file_appender(Path::new("/")).is_err());
    }
}
