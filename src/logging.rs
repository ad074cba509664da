//! Logging setup for the binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is up to
//! the executable.

use crate::error::{ConvoscribeError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Picks the filter directive from CLI verbosity and the configured level.
///
/// `-q` wins over everything. When the configured value is a plain level, each
/// `-v` raises it one step, up to `trace`. Any other directive is replaced by
/// `debug` for `-v` and `trace` for `-vv`.
pub fn filter_directive(configured: &str, verbose: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    if verbose == 0 {
        return configured.to_string();
    }
    let plain = configured.trim().to_ascii_lowercase();
    match LEVELS.iter().position(|level| *level == plain) {
        Some(index) => {
            let raised = (index + usize::from(verbose)).min(LEVELS.len() - 1);
            LEVELS[raised].to_string()
        }
        None if verbose == 1 => "debug".to_string(),
        None => "trace".to_string(),
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `directive`.
pub fn init(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|e| ConvoscribeError::ConfigInvalidValue {
            key: "logging.level".to_string(),
            message: e.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| ConvoscribeError::Other(format!("failed to install logger: {e}")))
}
