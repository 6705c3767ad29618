//! Tracing infrastructure.
//!
//! Structured, async-aware logging built on `tracing` and
//! `tracing-subscriber`. The level comes from configuration and can be
//! overridden at runtime through `RUST_LOG`; the output format (pretty,
//! compact, or JSON for log aggregation) is selected from configuration.

use crate::config::TelemetryConfig;
use crate::error::{AppResult, GloveError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development).
    Pretty,
    /// Compact format without colors (for production).
    Compact,
    /// JSON format for structured logging.
    Json,
}

impl OutputFormat {
    fn parse(s: &str) -> AppResult<Self> {
        match s {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(GloveError::Configuration(format!(
                "Unknown telemetry format '{other}'"
            ))),
        }
    }
}

/// Initialize the global tracing subscriber from configuration.
///
/// Returns an error if a global subscriber is already installed, so tests
/// that initialize their own subscriber can ignore the result.
pub fn init(config: &TelemetryConfig) -> AppResult<()> {
    let format = OutputFormat::parse(&config.format)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let layer = match format {
        OutputFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        OutputFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        OutputFormat::Json => fmt::layer().json().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| GloveError::Configuration(format!("Failed to install subscriber: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!(OutputFormat::parse("pretty").unwrap(), OutputFormat::Pretty);
        assert_eq!(
            OutputFormat::parse("compact").unwrap(),
            OutputFormat::Compact
        );
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(OutputFormat::parse("yaml").is_err());
    }
}
