//! Real signal delivery.
//!
//! Signals are process-wide, so everything that raises one lives in a single
//! test in its own binary.

#![cfg(unix)]

use graceful_shutdown::{listen, Lifecycle, Signal, ShutdownCoordinator, ShutdownReason, SignalSet};
use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::time::timeout;

fn raise_after(signal: NixSignal, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        kill(Pid::this(), signal).expect("failed to signal self");
    });
}

#[tokio::test]
async fn test_signals_trigger_shutdown() {
    // listen: SIGTERM completes the lifecycle
    let listener = listen(&Lifecycle::background());
    raise_after(NixSignal::SIGTERM, Duration::from_millis(100));

    let handled = timeout(Duration::from_millis(500), listener.lifecycle().done()).await;
    assert!(handled.is_ok(), "did not handle signal");
    assert_eq!(listener.received(), Some(Signal::Terminate));

    let released = timeout(Duration::from_millis(500), listener.released()).await;
    assert!(released.is_ok(), "signal subscriptions were not released");
    assert_eq!(listener.active_subscriptions(), 0);
    drop(listener);

    // coordinator: SIGINT runs the trackers and is reported as the reason
    let (lifecycle, coordinator) = ShutdownCoordinator::build(
        &Lifecycle::background(),
        Duration::from_millis(200),
        &SignalSet::default(),
    );
    let (tx, rx) = tokio::sync::oneshot::channel();
    coordinator.track("report", move |_| async move {
        let _ = tx.send(());
    });

    raise_after(NixSignal::SIGINT, Duration::from_millis(100));

    let result = timeout(Duration::from_secs(2), coordinator.wait()).await;
    assert!(result.is_ok(), "coordinator did not handle signal");
    assert!(result.unwrap().is_ok());
    assert!(lifecycle.is_done());
    assert!(rx.await.is_ok());
    assert_eq!(
        coordinator.reason(),
        Some(ShutdownReason::Signal(Signal::Interrupt))
    );
}
