//! Tracing subscriber setup shared by every subcommand.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingSection;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Pick the filter: `RUST_LOG` wins, then `--verbose`, then the config file.
pub fn build_filter(section: &LoggingSection, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_new(&section.filter).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init(section: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    layers.push(if section.json {
        console.json().boxed()
    } else {
        console.with_target(false).boxed()
    });

    let guard = match &section.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "flowdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers.with_filter(build_filter(section, verbose)))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_forces_debug_when_env_unset() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = build_filter(&LoggingSection::default(), true);
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_invalid_config_filter_falls_back_to_info() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let section = LoggingSection {
            filter: "flowdesk=notalevel".to_string(),
            ..LoggingSection::default()
        };
        assert_eq!(build_filter(&section, false).to_string(), "info");
    }
}
