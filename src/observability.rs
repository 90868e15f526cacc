//! Logging setup for the server and CLI.

use std::sync::Once;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    #[default]
    Pretty,
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `RUST_LOG` overrides the default `info` filter. Output goes to stderr so
/// command output on stdout stays machine-readable.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

/// Span wrapping one lifecycle operation on a task.
#[must_use]
pub fn task_span(operation: &'static str, task_id: &str, user_id: &str) -> Span {
    tracing::info_span!("task", op = operation, task_id = task_id, user_id = user_id)
}
