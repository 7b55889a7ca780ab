#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
//! # graceful-shutdown: coordinated process termination
//!
//! Register cleanup work up front, block until the process is asked to stop,
//! then run every piece of cleanup concurrently, each with its own deadline.
//!
//! ## Key Pieces
//!
//! - **[`Lifecycle`]**: cancellable, deadline-bearing scope handed to every tracker
//! - **[`listen`]**: lifecycle that completes on SIGINT/SIGTERM or when its parent does
//! - **[`ShutdownCoordinator`]**: tracker registry plus concurrent fan-out/fan-in
//! - **[`Config`]**: figment-layered settings for the timeout, signals and logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graceful_shutdown::{init_logging, Config, Lifecycle, Result, ShutdownCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_logging(&config)?;
//!
//!     let (lifecycle, coordinator) =
//!         ShutdownCoordinator::from_config(&Lifecycle::background(), &config);
//!
//!     coordinator.track("http-server", |deadline| async move {
//!         tokio::select! {
//!             () = deadline.done() => tracing::warn!("Drain cut short"),
//!             () = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
//!         }
//!     });
//!
//!     coordinator.track_blocking("flush-cache", |_deadline| {
//!         // synchronous cleanup
//!     });
//!
//!     // Hand `lifecycle` to long-running tasks so they stop with the process.
//!     let _ = lifecycle;
//!
//!     coordinator.wait().await
//! }
//! ```
//!
//! ## Caller-Supplied Lifecycle
//!
//! ```rust,no_run
//! use graceful_shutdown::{listen, Lifecycle, ShutdownCoordinator};
//! use std::time::Duration;
//!
//! # async fn run() -> graceful_shutdown::Result<()> {
//! let listener = listen(&Lifecycle::background());
//! let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
//! coordinator.track("db", |_deadline| async { /* close pool */ });
//! coordinator.wait_on(listener.lifecycle()).await
//! # }
//! ```

mod config;
mod error;
mod logging;

pub mod lifecycle;
pub mod shutdown;
pub mod signal;

pub use config::{Config, ConfigBuilder, LogConfig, LogLevel, ShutdownConfig};
pub use error::{Error, ErrorCode, Result};
pub use lifecycle::{DoneReason, Lifecycle};
pub use logging::init_logging;
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownStats, Tracker, TrackerFuture};
pub use signal::{
    listen, listen_with, live_subscriptions, try_listen_with, Listener, Signal, SignalSet,
};

/// Version of the graceful-shutdown library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default per-tracker shutdown timeout in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "shutdown.toml";
