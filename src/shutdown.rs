//! Shutdown coordination: the tracker registry and the fan-out/fan-in that
//! runs it.
//!
//! Trackers are registered up front with [`ShutdownCoordinator::track`] and
//! friends. Once the termination trigger fires, every tracker is started on
//! its own task with a fresh [`Lifecycle`] bounded by the coordinator's
//! timeout, and the coordinator returns only after all of them have finished.
//! The timeout is advisory: a tracker that ignores its lifecycle keeps the
//! coordinator waiting.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::signal::{listen_with, Listener, Signal, SignalSet};

/// Boxed future returned by a [`Tracker`].
pub type TrackerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A unit of cleanup work run once during shutdown.
///
/// The lifecycle passed to [`shutdown`](Tracker::shutdown) carries the
/// coordinator's timeout as its deadline. Honoring it is up to the tracker.
pub trait Tracker: Send + 'static {
    /// Run the cleanup.
    fn shutdown(self: Box<Self>, lifecycle: Lifecycle) -> TrackerFuture;

    /// Name used in logs.
    fn name(&self) -> &str {
        "tracker"
    }
}

struct FnTracker<F> {
    name: String,
    func: F,
}

impl<F, Fut> Tracker for FnTracker<F>
where
    F: FnOnce(Lifecycle) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn shutdown(self: Box<Self>, lifecycle: Lifecycle) -> TrackerFuture {
        Box::pin((self.func)(lifecycle))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct BlockingTracker<F> {
    name: String,
    func: F,
}

impl<F> Tracker for BlockingTracker<F>
where
    F: FnOnce(Lifecycle) + Send + 'static,
{
    fn shutdown(self: Box<Self>, lifecycle: Lifecycle) -> TrackerFuture {
        let Self { name, func } = *self;
        Box::pin(async move {
            if let Err(e) = tokio::task::spawn_blocking(move || func(lifecycle)).await {
                error!(tracker = %name, error = %e, "Blocking shutdown tracker panicked");
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Cancels a tracker's lifecycle when its task ends, panics included.
struct CancelOnDrop {
    lifecycle: Lifecycle,
    name: String,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(tracker = %self.name, "Shutdown tracker panicked");
        }
        self.lifecycle.cancel();
    }
}

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal arrived
    Signal(Signal),
    /// The watched lifecycle was cancelled or reached its deadline
    LifecycleDone,
    /// Shutdown requested programmatically via `close`
    Requested,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(sig) => write!(f, "Signal({})", sig.number()),
            Self::LifecycleDone => write!(f, "LifecycleDone"),
            Self::Requested => write!(f, "Requested"),
        }
    }
}

/// Where the termination trigger comes from.
#[derive(Debug)]
enum Trigger {
    /// Supplied by the caller at `wait_on`.
    External,
    /// Built by the coordinator from the signal source.
    Owned(Listener),
}

struct Inner {
    timeout: Duration,
    trackers: Mutex<Vec<Box<dyn Tracker>>>,
    registered: AtomicUsize,
    tasks: TaskTracker,
    trigger: Trigger,
    shutdown_initiated: AtomicBool,
    shutdown_reason: ArcSwapOption<ShutdownReason>,
    shutdown_time: Mutex<Option<Instant>>,
}

impl Inner {
    /// Record the trigger. The first reason wins.
    fn initiate(&self, reason: ShutdownReason) -> bool {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.shutdown_reason.store(Some(Arc::new(reason)));
            *self.shutdown_time.lock() = Some(Instant::now());
            info!(%reason, "Shutdown initiated");
            true
        } else {
            debug!(%reason, "Shutdown already initiated, ignoring additional trigger");
            false
        }
    }

    /// Start every pending tracker on its own task and close the task group.
    fn fan_out(&self) -> usize {
        let mut trackers = self.trackers.lock();
        if self.tasks.is_closed() {
            return 0;
        }
        let count = trackers.len();

        for tracker in trackers.drain(..) {
            let name = tracker.name().to_owned();
            let lifecycle = Lifecycle::new().with_timeout(self.timeout);
            let guard = CancelOnDrop {
                lifecycle: lifecycle.clone(),
                name: name.clone(),
            };

            self.tasks.spawn(async move {
                let _guard = guard;
                debug!(tracker = %name, "Running shutdown tracker");
                tracker.shutdown(lifecycle).await;
                debug!(tracker = %name, "Shutdown tracker finished");
            });
        }

        // Closing under the registry lock makes every concurrent caller wait
        // on the same set of tasks.
        self.tasks.close();
        count
    }
}

/// Coordinator that runs registered trackers once termination is triggered.
///
/// Clones share the same registry and trigger, so one clone can `close` while
/// another is blocked in `wait`.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("timeout", &self.inner.timeout)
            .field("registered", &self.len())
            .field("trigger", &self.inner.trigger)
            .field("is_shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl ShutdownCoordinator {
    fn with_trigger(timeout: Duration, trigger: Trigger) -> Self {
        Self {
            inner: Arc::new(Inner {
                timeout,
                trackers: Mutex::new(Vec::new()),
                registered: AtomicUsize::new(0),
                tasks: TaskTracker::new(),
                trigger,
                shutdown_initiated: AtomicBool::new(false),
                shutdown_reason: ArcSwapOption::empty(),
                shutdown_time: Mutex::new(None),
            }),
        }
    }

    /// Create a coordinator that waits on a caller-supplied lifecycle.
    ///
    /// Use [`wait_on`](Self::wait_on) to block.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_trigger(timeout, Trigger::External)
    }

    /// Create a coordinator that owns its trigger: a lifecycle derived from
    /// `parent` that also completes on any of `signals`.
    ///
    /// Use [`wait`](Self::wait) or [`close`](Self::close) to shut down.
    /// Dropping the last clone of the coordinator stops the listener, which
    /// also completes the returned lifecycle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn build(parent: &Lifecycle, timeout: Duration, signals: &SignalSet) -> (Lifecycle, Self) {
        let listener = listen_with(parent, signals);
        let lifecycle = listener.lifecycle().clone();
        (lifecycle, Self::with_trigger(timeout, Trigger::Owned(listener)))
    }

    /// Like [`build`](Self::build), taking the timeout and signals from `config`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn from_config(parent: &Lifecycle, config: &Config) -> (Lifecycle, Self) {
        Self::build(parent, config.shutdown_timeout(), &config.signal_set())
    }

    /// Register an async tracker.
    pub fn track<S, F, Fut>(&self, name: S, func: F)
    where
        S: Into<String>,
        F: FnOnce(Lifecycle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.track_tracker(FnTracker {
            name: name.into(),
            func,
        });
    }

    /// Register a tracker that blocks; it runs on the blocking thread pool.
    pub fn track_blocking<S, F>(&self, name: S, func: F)
    where
        S: Into<String>,
        F: FnOnce(Lifecycle) + Send + 'static,
    {
        self.track_tracker(BlockingTracker {
            name: name.into(),
            func,
        });
    }

    /// Register a [`Tracker`] implementation.
    pub fn track_tracker<T: Tracker>(&self, tracker: T) {
        let mut trackers = self.inner.trackers.lock();
        if self.inner.tasks.is_closed() {
            warn!(
                tracker = tracker.name(),
                "Tracker registered after shutdown started, it will not run"
            );
        } else {
            debug!(tracker = tracker.name(), "Registered shutdown tracker");
        }
        trackers.push(Box::new(tracker));
        self.inner.registered.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of trackers registered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.registered.load(Ordering::Acquire)
    }

    /// Check if no tracker has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The per-tracker timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Whether this coordinator owns its trigger.
    #[must_use]
    pub fn owns_lifecycle(&self) -> bool {
        matches!(self.inner.trigger, Trigger::Owned(_))
    }

    /// The owned trigger's lifecycle, `None` for an external coordinator.
    #[must_use]
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        match &self.inner.trigger {
            Trigger::Owned(listener) => Some(listener.lifecycle().clone()),
            Trigger::External => None,
        }
    }

    /// Block until `lifecycle` is done, then run every tracker.
    ///
    /// On a coordinator built with [`build`](Self::build) this also stops
    /// the owned listener, completing its lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unterminable`] immediately when `lifecycle` has no
    /// cancel or deadline path. Never fails once the trigger has fired.
    pub async fn wait_on(&self, lifecycle: &Lifecycle) -> Result<()> {
        if !lifecycle.is_terminable() {
            return Err(Error::unterminable("context is not terminable, cannot wait"));
        }

        lifecycle.done().await;
        self.inner.initiate(ShutdownReason::LifecycleDone);
        self.run().await;
        Ok(())
    }

    /// Block until the owned trigger fires, stop observing signals, then run
    /// every tracker.
    ///
    /// # Errors
    ///
    /// Returns an invalid state error without blocking when the coordinator
    /// was created with [`new`](Self::new) and has no trigger of its own.
    pub async fn wait(&self) -> Result<()> {
        let Trigger::Owned(listener) = &self.inner.trigger else {
            return Err(Error::invalid_state(
                "Coordinator has no lifecycle of its own, use wait_on",
            ));
        };

        listener.lifecycle().done().await;
        let reason = listener
            .received()
            .map_or(ShutdownReason::LifecycleDone, ShutdownReason::Signal);
        self.inner.initiate(reason);

        self.run().await;
        Ok(())
    }

    /// Shut down now: stop observing signals and run every tracker.
    ///
    /// Safe to call more than once and concurrently with [`wait`](Self::wait);
    /// every caller returns after all trackers have finished.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    pub async fn close(&self) -> Result<()> {
        // Record the reason before `run` stops the listener, so a concurrent
        // `wait` woken by the stop does not claim it.
        self.inner.initiate(ShutdownReason::Requested);
        self.run().await;
        Ok(())
    }

    /// Release the owned trigger, then fan out and join. The caller has
    /// already recorded the reason.
    async fn run(&self) {
        if let Trigger::Owned(listener) = &self.inner.trigger {
            listener.stop();
        }

        let started = Instant::now();
        let count = self.inner.fan_out();
        if count > 0 {
            info!(
                trackers = count,
                timeout = ?self.inner.timeout,
                "Running shutdown trackers"
            );
        }

        self.inner.tasks.wait().await;

        if count > 0 {
            info!(trackers = count, elapsed = ?started.elapsed(), "All shutdown trackers finished");
        }
    }

    /// Check if shutdown has been initiated.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown_initiated.load(Ordering::Acquire)
    }

    /// What started the shutdown, once it has started.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner.shutdown_reason.load_full().map(|reason| *reason)
    }

    /// Get statistics about the shutdown process.
    #[must_use]
    pub fn stats(&self) -> ShutdownStats {
        ShutdownStats {
            is_shutdown: self.is_shutdown(),
            reason: self.reason(),
            shutdown_time: *self.inner.shutdown_time.lock(),
            registered: self.len(),
            running: self.inner.tasks.len(),
        }
    }
}

/// Statistics about the shutdown process.
#[derive(Debug, Clone)]
pub struct ShutdownStats {
    /// Whether shutdown has been initiated
    pub is_shutdown: bool,
    /// Reason for shutdown
    pub reason: Option<ShutdownReason>,
    /// Time when shutdown was initiated
    pub shutdown_time: Option<Instant>,
    /// Total number of registered trackers
    pub registered: usize,
    /// Tracker tasks that have not finished yet
    pub running: usize,
}

impl ShutdownStats {
    /// Check if shutdown started and every tracker task has finished.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.is_shutdown && self.running == 0
    }

    /// Get the elapsed time since shutdown was initiated.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.shutdown_time.map(|t| t.elapsed())
    }
}
