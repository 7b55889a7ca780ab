//! OS signal source for graceful shutdown.
//!
//! [`listen`] derives a [`Lifecycle`] from a parent and completes it when a
//! termination signal arrives. The returned [`Listener`] owns the OS
//! subscriptions; stopping or dropping it releases them. Once no listener
//! holds a subscription to a signal, that signal gets its default action
//! back, so a stuck shutdown can still be interrupted.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;

/// A termination signal the listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// SIGINT, or Ctrl+C on Windows
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// SIGHUP
    Hangup,
    /// SIGUSR1
    User1,
    /// SIGUSR2
    User2,
}

impl Signal {
    /// Signal number on this platform.
    #[cfg(unix)]
    #[must_use]
    pub const fn number(self) -> i32 {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};

        match self {
            Self::Hangup => SIGHUP,
            Self::Interrupt => SIGINT,
            Self::Quit => SIGQUIT,
            Self::User1 => SIGUSR1,
            Self::User2 => SIGUSR2,
            Self::Terminate => SIGTERM,
        }
    }

    /// Signal number, using the Linux values where the platform has none.
    #[cfg(not(unix))]
    #[must_use]
    pub const fn number(self) -> i32 {
        match self {
            Self::Hangup => 1,
            Self::Interrupt => 2,
            Self::Quit => 3,
            Self::User1 => 10,
            Self::User2 => 12,
            Self::Terminate => 15,
        }
    }

    /// Human-readable description of the signal.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Hangup => "SIGHUP (Hangup)",
            Self::Interrupt => "SIGINT (Interrupt/Ctrl+C)",
            Self::Quit => "SIGQUIT (Quit)",
            Self::User1 => "SIGUSR1 (User-defined 1)",
            Self::User2 => "SIGUSR2 (User-defined 2)",
            Self::Terminate => "SIGTERM (Terminate)",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Ordered, de-duplicated set of signals to listen for.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SignalSet(Vec<Signal>);

impl SignalSet {
    /// An empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Add a signal, ignoring duplicates.
    #[must_use]
    pub fn with(mut self, signal: Signal) -> Self {
        self.insert(signal);
        self
    }

    /// Add a signal in place. Returns `false` if it was already present.
    pub fn insert(&mut self, signal: Signal) -> bool {
        if self.0.contains(&signal) {
            return false;
        }
        self.0.push(signal);
        true
    }

    /// Check whether the set contains `signal`.
    #[must_use]
    pub fn contains(&self, signal: Signal) -> bool {
        self.0.contains(&signal)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        self.0.iter().copied()
    }

    /// Number of signals in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SignalSet {
    /// Interrupt and terminate.
    fn default() -> Self {
        Self(vec![Signal::Interrupt, Signal::Terminate])
    }
}

impl FromIterator<Signal> for SignalSet {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

#[cfg(unix)]
mod os {
    use super::Signal;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::debug;

    /// The runtime keeps its handler for a signal installed for the life of
    /// the process, swallowing every delivery. Each signal that was ever
    /// subscribed also gets a handler that runs the default action whenever
    /// no subscription is live.
    struct Fallback {
        signal: Signal,
        live: usize,
        default_action: Arc<AtomicBool>,
    }

    static FALLBACKS: Mutex<Vec<Fallback>> = parking_lot::const_mutex(Vec::new());

    fn acquire(sig: Signal) -> std::io::Result<()> {
        let mut fallbacks = FALLBACKS.lock();
        if let Some(fallback) = fallbacks.iter_mut().find(|f| f.signal == sig) {
            fallback.live += 1;
            fallback.default_action.store(false, Ordering::Release);
            return Ok(());
        }

        let default_action = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register_conditional_default(sig.number(), Arc::clone(&default_action))?;
        fallbacks.push(Fallback {
            signal: sig,
            live: 1,
            default_action,
        });
        Ok(())
    }

    fn release(sig: Signal) {
        let mut fallbacks = FALLBACKS.lock();
        if let Some(fallback) = fallbacks.iter_mut().find(|f| f.signal == sig) {
            fallback.live = fallback.live.saturating_sub(1);
            if fallback.live == 0 {
                fallback.default_action.store(true, Ordering::Release);
                debug!(signal = %sig, "No subscription left, default signal action restored");
            }
        }
    }

    /// Live subscriptions to `sig` across the process.
    pub(super) fn live(sig: Signal) -> usize {
        FALLBACKS
            .lock()
            .iter()
            .find(|f| f.signal == sig)
            .map_or(0, |f| f.live)
    }

    pub(super) struct Subscription {
        signal: Signal,
        stream: tokio::signal::unix::Signal,
    }

    impl Subscription {
        pub(super) fn install(sig: Signal) -> std::io::Result<Option<Self>> {
            let kind = match sig {
                Signal::Interrupt => SignalKind::interrupt(),
                Signal::Terminate => SignalKind::terminate(),
                Signal::Quit => SignalKind::quit(),
                Signal::Hangup => SignalKind::hangup(),
                Signal::User1 => SignalKind::user_defined1(),
                Signal::User2 => SignalKind::user_defined2(),
            };
            let stream = signal(kind)?;
            acquire(sig)?;
            Ok(Some(Self {
                signal: sig,
                stream,
            }))
        }

        pub(super) async fn recv(&mut self) -> bool {
            self.stream.recv().await.is_some()
        }
    }

    impl Drop for Subscription {
        fn drop(&mut self) {
            release(self.signal);
        }
    }
}

#[cfg(not(unix))]
mod os {
    use super::Signal;

    pub(super) struct Subscription;

    pub(super) fn live(_sig: Signal) -> usize {
        0
    }

    impl Subscription {
        pub(super) fn install(sig: Signal) -> std::io::Result<Option<Self>> {
            Ok(matches!(sig, Signal::Interrupt).then_some(Self))
        }

        pub(super) async fn recv(&mut self) -> bool {
            tokio::signal::ctrl_c().await.is_ok()
        }
    }
}

use os::Subscription;

/// Derived lifecycle that completes on the first observed termination signal.
///
/// Dropping the listener stops it.
#[derive(Debug)]
pub struct Listener {
    lifecycle: Lifecycle,
    received: Arc<Mutex<Option<Signal>>>,
    stopped: AtomicBool,
    watchers: TaskTracker,
}

impl Listener {
    fn spawn(parent: &Lifecycle, subscriptions: Vec<(Signal, Subscription)>) -> Self {
        let lifecycle = parent.child();
        let received = Arc::new(Mutex::new(None));
        let watchers = TaskTracker::new();

        for (signal, mut subscription) in subscriptions {
            let lifecycle = lifecycle.clone();
            let received = Arc::clone(&received);

            watchers.spawn(async move {
                tokio::select! {
                    () = lifecycle.done() => {
                        debug!(%signal, "Lifecycle done, releasing signal subscription");
                    }
                    true = subscription.recv() => {
                        {
                            let mut slot = received.lock();
                            if slot.is_none() {
                                *slot = Some(signal);
                                info!(%signal, "Received termination signal, initiating graceful shutdown");
                            }
                        }
                        lifecycle.cancel();
                    }
                }
            });
        }
        watchers.close();

        Self {
            lifecycle,
            received,
            stopped: AtomicBool::new(false),
            watchers,
        }
    }

    /// The derived lifecycle.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The signal that completed the lifecycle, if one did.
    #[must_use]
    pub fn received(&self) -> Option<Signal> {
        *self.received.lock()
    }

    /// Stop observing signals and cancel the derived lifecycle.
    ///
    /// Returns `true` only for the call that actually stopped the listener.
    pub fn stop(&self) -> bool {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.lifecycle.cancel();
        debug!("Signal listener stopped");
        true
    }

    /// Check if [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of signal subscriptions still held.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.watchers.len()
    }

    /// Wait until every signal subscription has been released.
    ///
    /// Resolves once the lifecycle is done, whatever completed it.
    pub async fn released(&self) {
        self.watchers.wait().await;
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Number of live subscriptions to `signal` held by listeners in this process.
///
/// Zero means the signal has its default action.
#[must_use]
pub fn live_subscriptions(signal: Signal) -> usize {
    os::live(signal)
}

/// Listen for interrupt and terminate on a lifecycle derived from `parent`.
///
/// Never fails: a signal that cannot be subscribed to is logged and skipped.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
#[must_use]
pub fn listen(parent: &Lifecycle) -> Listener {
    listen_with(parent, &SignalSet::default())
}

/// Listen for a custom set of signals on a lifecycle derived from `parent`.
///
/// Never fails: a signal that cannot be subscribed to is logged and skipped.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
#[must_use]
pub fn listen_with(parent: &Lifecycle, signals: &SignalSet) -> Listener {
    let mut subscriptions = Vec::with_capacity(signals.len());
    for signal in signals.iter() {
        match Subscription::install(signal) {
            Ok(Some(subscription)) => subscriptions.push((signal, subscription)),
            Ok(None) => debug!(%signal, "Signal not observable on this platform, skipping"),
            Err(e) => warn!(%signal, error = %e, "Failed to register signal handler, skipping"),
        }
    }

    debug!(count = subscriptions.len(), "Signal handlers registered");
    Listener::spawn(parent, subscriptions)
}

/// Like [`listen_with`] but fails if any signal cannot be subscribed to.
///
/// # Errors
///
/// Returns a signal error carrying the signal number of the first
/// subscription that failed.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn try_listen_with(parent: &Lifecycle, signals: &SignalSet) -> Result<Listener> {
    let mut subscriptions = Vec::with_capacity(signals.len());
    for signal in signals.iter() {
        let subscription = Subscription::install(signal).map_err(|e| {
            Error::signal_register(
                format!("Failed to register {signal} handler"),
                signal.number(),
                e,
            )
        })?;
        if let Some(subscription) = subscription {
            subscriptions.push((signal, subscription));
        }
    }

    Ok(Listener::spawn(parent, subscriptions))
}
