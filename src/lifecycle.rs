//! Cancellable, deadline-bearing lifecycle handles.
//!
//! A [`Lifecycle`] is the execution scope handed around the crate: the signal
//! source produces one, the coordinator waits on one, and every shutdown
//! tracker receives one bounded by the configured timeout. Handles form a
//! tree. Cancelling a handle cancels everything derived from it, while a
//! derived handle never affects its parent.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a lifecycle reached the done state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The handle or one of its ancestors was cancelled.
    Cancelled,
    /// The deadline passed before any cancellation.
    DeadlineExceeded,
}

impl std::fmt::Display for DoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Cancelled"),
            Self::DeadlineExceeded => write!(f, "DeadlineExceeded"),
        }
    }
}

/// Handle over a cancellable, optionally deadline-bearing scope.
///
/// Clones share state: cancelling a clone cancels the original. The done
/// transition happens at most once and is never undone, and the first reason
/// observed for it is the one reported from then on.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    /// `None` only for the background root, which can never finish.
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
    /// Set together with `token`.
    reason: Option<Arc<OnceLock<DoneReason>>>,
}

impl Lifecycle {
    /// The process-wide root. It has no cancel path and no deadline.
    #[must_use]
    pub const fn background() -> Self {
        Self {
            token: None,
            deadline: None,
            reason: None,
        }
    }

    /// A fresh cancellable root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Some(CancellationToken::new()),
            deadline: None,
            reason: Some(Arc::default()),
        }
    }

    /// Derive a handle that is done when `self` is done or when it is cancelled itself.
    #[must_use]
    pub fn child(&self) -> Self {
        let token = self
            .token
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);

        Self {
            token: Some(token),
            deadline: self.deadline,
            reason: Some(Arc::default()),
        }
    }

    /// Derive a handle that is additionally done once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derive a handle that is additionally done at `deadline`.
    ///
    /// The effective deadline is the earlier of `deadline` and the parent's.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        child
    }

    /// Whether this handle can ever become done.
    #[must_use]
    pub const fn is_terminable(&self) -> bool {
        self.token.is_some() || self.deadline.is_some()
    }

    /// Check if the handle has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the handle is done, or `None` while it is still live.
    ///
    /// The first reason observed is latched: a handle that reported
    /// [`DoneReason::DeadlineExceeded`] keeps doing so after it is cancelled.
    /// When both hold on first observation, cancellation wins.
    #[must_use]
    pub fn reason(&self) -> Option<DoneReason> {
        let latch = self.reason.as_ref()?;
        if let Some(reason) = latch.get() {
            return Some(*reason);
        }

        let observed = if self
            .token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            DoneReason::Cancelled
        } else {
            match self.deadline {
                Some(deadline) if Instant::now() >= deadline => DoneReason::DeadlineExceeded,
                _ => return None,
            }
        };

        Some(*latch.get_or_init(|| observed))
    }

    /// Wait until the handle is done.
    ///
    /// Never resolves for a handle that is not terminable.
    pub async fn done(&self) {
        match (&self.token, self.deadline) {
            (Some(token), Some(deadline)) => {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            (Some(token), None) => token.cancelled().await,
            (None, Some(deadline)) => tokio::time::sleep_until(deadline.into()).await,
            (None, None) => std::future::pending().await,
        }
        let _ = self.reason();
    }

    /// Cancel this handle and every handle derived from it.
    ///
    /// Idempotent; a no-op on the background root.
    pub fn cancel(&self) {
        if let Some(token) = &self.token {
            // an already elapsed deadline is the earlier reason
            let _ = self.reason();
            token.cancel();
        }
    }

    /// The effective deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` without a deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::background()
    }
}
