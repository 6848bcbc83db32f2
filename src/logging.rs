//! Logging setup.
//!
//! Log records go to stderr so that query output on stdout stays machine-readable.
//! `RUST_LOG` takes precedence over the configured level.
//!
//! ```no_run
//! dsbrowse::logging::init("debug").unwrap();
//! tracing::info!("ready");
//! ```

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Parse a level or filter directive list such as `debug` or `info,dsbrowse=trace`.
pub fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {}", level))
}

/// Build the filter: `RUST_LOG` if set and valid, otherwise `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => level_filter(level),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(level: &str) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(level)?)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    tracing::debug!(level, "logging initialized");
    Ok(())
}
