//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Honour `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - Human-readable output only; the progress lines are read by operators
//! - Secrets never reach a log event: the signer and relay types hide them in `Debug`

use tracing_subscriber::EnvFilter;

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Default directive when neither `RUST_LOG` nor the config sets a level.
const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter: `RUST_LOG` wins, then the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (tests, embedding).
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config));

    let result = match config.log_format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    result.is_ok()
}
