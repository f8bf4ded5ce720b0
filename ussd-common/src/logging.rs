//! Logging bootstrap for the USSD router.
//!
//! One subscriber per process: an `EnvFilter` built from the configured
//! level (or `RUST_LOG`), plus either a JSON or a human-readable formatter.
//! HTTP plumbing crates are capped at `warn` so per-callback dispatch lines
//! are not drowned out.

use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Crates capped at `warn` unless `RUST_LOG` says otherwise.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "h2", "tower_http", "handlebars"];

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, with span fields and close events
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" | "" => Ok(Self::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

fn filter_directives(log_level: &str) -> String {
    NOISY_MODULES
        .iter()
        .fold(log_level.trim().to_string(), |mut directives, module| {
            directives.push_str(&format!(",{module}=warn"));
            directives
        })
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(log_level)))
        .unwrap_or_else(|_| EnvFilter::new(filter_directives("info")))
}

/// Install the global subscriber.
///
/// `log_format` is `json` or `pretty`; anything else falls back to pretty.
/// Later calls are no-ops.
pub fn init_logging(log_level: &str, log_format: &str) {
    let format = log_format.parse::<LogFormat>();
    let registry = tracing_subscriber::registry().with(build_filter(log_level));

    let installed = match format.clone().unwrap_or_default() {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
    };

    if installed.is_ok() {
        if let Err(reason) = format {
            tracing::warn!(%reason, "Falling back to pretty log output");
        }
        tracing::debug!(log_level, log_format, "Logging initialized");
    }
}

/// Fresh id correlating every log line of one callback.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
