//! Global `tracing` subscriber setup.

use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::error::{Error, Result};

fn filter(config: &Config) -> EnvFilter {
    let level: tracing::Level = config.logging.level.into();
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Install a global fmt subscriber configured from `config`.
///
/// `RUST_LOG` directives are honored on top of the configured level.
///
/// # Errors
///
/// Returns a config error if JSON output is requested without the
/// `json-logs` feature, or if a global subscriber is already installed.
pub fn init_logging(config: &Config) -> Result<()> {
    if config.is_json_logging() {
        #[cfg(feature = "json-logs")]
        {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter(config))
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::config(format!("Failed to initialize JSON logging: {e}")))?;

            debug!(name = %config.name, "JSON logging initialized");
            return Ok(());
        }

        #[cfg(not(feature = "json-logs"))]
        {
            return Err(Error::config(
                "JSON logging requested but feature not enabled",
            ));
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter(config))
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(config.is_colored_logging())
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::config(format!("Failed to initialize logging: {e}")))?;

    debug!(
        name = %config.name,
        level = ?config.logging.level,
        "Logging initialized"
    );
    Ok(())
}
