//! Configuration management.
//!
//! Settings are layered with figment: defaults, then an optional TOML file,
//! then `SHUTDOWN_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `SHUTDOWN_SHUTDOWN__TIMEOUT_MS=2000`).

#[cfg(feature = "toml")]
use figment::providers::{Format, Toml};
use figment::providers::{Env, Serialized};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::signal::{Signal, SignalSet};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level logging (most verbose)
    Trace,
    /// Debug level logging
    Debug,
    /// Info level logging (default)
    #[default]
    Info,
    /// Warning level logging
    Warn,
    /// Error level logging
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Logging level
    pub level: LogLevel,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Enable colored output (ignored for JSON logs)
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            color: true,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Time each tracker is given, in milliseconds
    pub timeout_ms: u64,
    /// Signals that trigger shutdown
    pub signals: SignalSet,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: crate::DEFAULT_SHUTDOWN_TIMEOUT_MS,
            signals: SignalSet::default(),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name, used in logs
    pub name: String,
    /// Logging configuration
    pub logging: LogConfig,
    /// Shutdown configuration
    pub shutdown: ShutdownConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::from("graceful-shutdown"),
            logging: LogConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config with defaults.
    ///
    /// # Errors
    ///
    /// Will return an error if the default configuration validation fails.
    pub fn new() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. `shutdown.toml` (if it exists)
    /// 3. Environment variables
    ///
    /// # Errors
    ///
    /// Will return an error if a source cannot be parsed or the result is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from_file(crate::DEFAULT_CONFIG_FILE)
    }

    /// Load config from a file, layered over defaults and under the environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Will return an error if the file contains invalid configuration data.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        #[allow(unused_mut)]
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        #[cfg(feature = "toml")]
        {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        #[cfg(not(feature = "toml"))]
        {
            if path.exists() {
                tracing::warn!(path = %path.display(), "TOML support disabled, ignoring config file");
            }
        }

        Self::extract(figment.merge(Self::env()))
    }

    /// Load config using a configuration provider, merged last.
    ///
    /// # Errors
    ///
    /// Will return an error if the provider fails to load a valid configuration.
    pub fn load_with_provider<P: Provider>(provider: P) -> Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Self::env())
                .merge(provider),
        )
    }

    fn env() -> Env {
        Env::prefixed("SHUTDOWN_").split("__")
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the per-tracker shutdown timeout as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.timeout_ms)
    }

    /// Get the configured signal set.
    #[must_use]
    pub fn signal_set(&self) -> SignalSet {
        self.shutdown.signals.clone()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if any configuration values are invalid or missing required fields.
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.timeout_ms == 0 {
            return Err(Error::config("Shutdown timeout must be greater than 0"));
        }

        if self.shutdown.signals.is_empty() {
            return Err(Error::config("At least one shutdown signal must be configured"));
        }

        if self.name.is_empty() {
            return Err(Error::config("Name cannot be empty"));
        }

        Ok(())
    }

    /// Check if JSON logging is enabled.
    #[must_use]
    pub const fn is_json_logging(&self) -> bool {
        self.logging.json
    }

    /// Check if colored logging is enabled.
    #[must_use]
    pub const fn is_colored_logging(&self) -> bool {
        self.logging.color && !self.logging.json
    }

    /// Create a builder for this configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for creating configurations programmatically.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the service name.
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the log level.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Enable JSON logging.
    #[must_use]
    pub const fn json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    /// Enable colored output.
    #[must_use]
    pub const fn color(mut self, enabled: bool) -> Self {
        self.config.logging.color = enabled;
        self
    }

    /// Set the per-tracker shutdown timeout.
    ///
    /// # Errors
    ///
    /// Will return an error if the duration exceeds `u64::MAX` milliseconds
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.config.shutdown.timeout_ms = u64::try_from(timeout.as_millis())
            .map_err(|_| Error::config("Shutdown timeout too large"))?;
        Ok(self)
    }

    /// Replace the signal set.
    #[must_use]
    pub fn signals<I: IntoIterator<Item = Signal>>(mut self, signals: I) -> Self {
        self.config.shutdown.signals = signals.into_iter().collect();
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if the resulting configuration is invalid.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.name, "graceful-shutdown");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(!config.logging.json);
        assert!(config.logging.color);
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(5000));
        assert_eq!(config.signal_set(), SignalSet::default());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .name("test-service")
            .log_level(LogLevel::Debug)
            .json_logging(true)
            .shutdown_timeout(Duration::from_secs(10))
            .unwrap()
            .signals([Signal::Terminate, Signal::Hangup])
            .build()
            .unwrap();

        assert_eq!(config.name, "test-service");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.is_json_logging());
        assert!(!config.is_colored_logging());
        assert_eq!(config.shutdown.timeout_ms, 10_000);
        assert!(config.signal_set().contains(Signal::Hangup));
        assert!(!config.signal_set().contains(Signal::Interrupt));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.shutdown.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.shutdown.timeout_ms = 5000;
        config.shutdown.signals = SignalSet::empty();
        assert!(config.validate().is_err());

        config.shutdown.signals = SignalSet::default();
        config.name.clear();
        assert!(config.validate().is_err());

        config.name = "ok".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_empty_signals() {
        let result = Config::builder().signals(Vec::<Signal>::new()).build();
        assert!(result.unwrap_err().is_config_error());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_load_from_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shutdown.toml",
                r#"
                    name = "from-file"

                    [logging]
                    level = "warn"

                    [shutdown]
                    timeout_ms = 1500
                    signals = ["terminate"]
                "#,
            )?;

            let config = Config::load().expect("file config");
            assert_eq!(config.name, "from-file");
            assert_eq!(config.logging.level, LogLevel::Warn);
            assert_eq!(config.shutdown_timeout(), Duration::from_millis(1500));
            assert_eq!(config.signal_set().iter().collect::<Vec<_>>(), vec![Signal::Terminate]);

            jail.set_env("SHUTDOWN_SHUTDOWN__TIMEOUT_MS", "250");
            let config = Config::load().expect("env config");
            assert_eq!(config.shutdown_timeout(), Duration::from_millis(250));
            assert_eq!(config.name, "from-file");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = Config::load_from_file("does-not-exist.toml").expect("defaults");
            assert_eq!(config.name, "graceful-shutdown");
            Ok(())
        });
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_invalid_file_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("shutdown.toml", "[shutdown]\ntimeout_ms = 0\n")?;
            let err = Config::load().unwrap_err();
            assert!(err.is_config_error());

            jail.create_file("shutdown.toml", "[shutdown]\nsignals = [\"bogus\"]\n")?;
            let err = Config::load().unwrap_err();
            assert_eq!(err.code(), crate::error::ErrorCode::ConfigParse);
            Ok(())
        });
    }

    #[test]
    fn test_load_with_provider() {
        let config = Config::load_with_provider(Serialized::default("name", "provided")).unwrap();
        assert_eq!(config.name, "provided");
    }
}
