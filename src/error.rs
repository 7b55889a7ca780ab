//! Error handling for the graceful-shutdown crate.
//!
//! The taxonomy is deliberately small. Tracker failures never reach the
//! coordinator and a tracker overrunning its timeout is not an error, so the
//! only runtime failure the coordinator itself reports is being asked to wait
//! on a lifecycle that can never finish.
//!
//! Each variant carries an [`ErrorCode`] for programmatic handling and a
//! human-readable message.
//!
//! ```no_run
//! use graceful_shutdown::{Error, Lifecycle, ShutdownCoordinator};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
//! match coordinator.wait_on(&Lifecycle::background()).await {
//!     Err(Error::Unterminable { .. }) => eprintln!("nothing can ever stop this lifecycle"),
//!     other => other.unwrap(),
//! }
//! # }
//! ```

/// Result type alias for graceful-shutdown operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error code enum for categorizing and identifying errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    // Configuration errors: 1000-1999
    /// A configuration value failed validation
    ConfigInvalid = 1000,
    /// A configuration source could not be parsed
    ConfigParse = 1001,

    // Signal handling errors: 2000-2999
    /// An OS signal subscription could not be installed
    SignalRegisterFailed = 2000,

    // Shutdown errors: 3000-3999
    /// The lifecycle handed to the coordinator can never become done
    ContextUnterminable = 3000,

    // IO errors: 5000-5999
    /// Generic I/O failure
    IoError = 5000,

    // State errors: 9000-9999
    /// Operation not valid for the current configuration or state
    InvalidStateValue = 9001,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), *self as i32)
    }
}

impl ErrorCode {
    /// Convert error code to string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigParse => "CONFIG_PARSE",
            Self::SignalRegisterFailed => "SIGNAL_REGISTER_FAILED",
            Self::ContextUnterminable => "CONTEXT_UNTERMINABLE",
            Self::IoError => "IO_ERROR",
            Self::InvalidStateValue => "INVALID_STATE_VALUE",
        }
    }
}

/// Errors raised by the coordinator, the signal source and the configuration layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The lifecycle passed to `wait_on` has no cancel or deadline path.
    #[error("Shutdown error [{code}]: {message}")]
    Unterminable {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
    },

    /// Signal subscription errors
    #[error("Signal handling error [{code}]: {message} (signal {signal:?})")]
    Signal {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Signal number if applicable
        signal: Option<i32>,
        /// Underlying OS error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Configuration-related errors
    #[error("Configuration error [{code}]: {message}")]
    Config {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// I/O operation errors
    #[error("I/O error [{code}]: {message}")]
    Io {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Invalid state errors
    #[error("Invalid state [{code}]: {message}")]
    InvalidState {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
    },
}

impl Error {
    /// Create the error returned when waiting on a lifecycle that can never be done.
    pub fn unterminable<S: Into<String>>(message: S) -> Self {
        Self::Unterminable {
            code: ErrorCode::ContextUnterminable,
            message: message.into(),
        }
    }

    /// Create a signal registration error for the given signal number.
    pub fn signal_register<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        signal: i32,
        source: E,
    ) -> Self {
        Self::Signal {
            code: ErrorCode::SignalRegisterFailed,
            message: message.into(),
            signal: Some(signal),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            code: ErrorCode::ConfigInvalid,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error for a source that failed to parse.
    pub fn config_parse<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Config {
            code: ErrorCode::ConfigParse,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new I/O error with source error.
    pub fn io_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Io {
            code: ErrorCode::IoError,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new invalid state error.
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            code: ErrorCode::InvalidStateValue,
            message: message.into(),
        }
    }

    /// Get the structured error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unterminable { code, .. }
            | Self::Signal { code, .. }
            | Self::Config { code, .. }
            | Self::Io { code, .. }
            | Self::InvalidState { code, .. } => *code,
        }
    }

    /// Check if this error reports an unterminable lifecycle.
    #[must_use]
    pub const fn is_unterminable(&self) -> bool {
        matches!(self, Self::Unterminable { .. })
    }

    /// Check if this error is configuration-related.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Get the error category for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Unterminable { .. } => "shutdown",
            Self::Signal { .. } => "signal",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
            Self::InvalidState { .. } => "state",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_with_source("I/O operation failed", err)
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::config_parse("Configuration loading failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unterminable_error() {
        let err = Error::unterminable("context is not terminable, cannot wait");
        assert!(err.is_unterminable());
        assert_eq!(err.code(), ErrorCode::ContextUnterminable);
        assert_eq!(err.category(), "shutdown");
        assert!(err.to_string().contains("CONTEXT_UNTERMINABLE(3000)"));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("test message");
        assert!(err.is_config_error());
        assert_eq!(err.category(), "config");
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_signal_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "no handler");
        let err = Error::signal_register("Failed to register SIGTERM handler", 15, io_err);
        assert_eq!(err.code(), ErrorCode::SignalRegisterFailed);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("Some(15)"));
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.code(), ErrorCode::IoError);
        assert_eq!(err.category(), "io");
    }
}
