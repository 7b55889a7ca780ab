//! Integration tests for graceful-shutdown.

use graceful_shutdown::{
    Config, Lifecycle, LogLevel, Signal, ShutdownCoordinator, ShutdownReason,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

#[tokio::test]
async fn test_coordinator_from_config() {
    let test_timeout = Duration::from_secs(2);
    let config = Config::builder()
        .name("integration")
        .log_level(LogLevel::Error)
        .shutdown_timeout(Duration::from_millis(150))
        .unwrap()
        .signals([Signal::User2])
        .build()
        .unwrap();

    let parent = Lifecycle::new();
    let (lifecycle, coordinator) = ShutdownCoordinator::from_config(&parent, &config);
    assert!(coordinator.owns_lifecycle());
    assert_eq!(coordinator.timeout(), Duration::from_millis(150));

    let closed = Arc::new(AtomicUsize::new(0));
    for name in ["db", "cache", "http"] {
        let closed = Arc::clone(&closed);
        coordinator.track(name, move |deadline| async move {
            deadline.done().await;
            closed.fetch_add(1, Ordering::SeqCst);
        });
    }

    parent.cancel();
    assert!(lifecycle.is_done());

    let started = Instant::now();
    let result = timeout(test_timeout, coordinator.wait()).await;
    assert!(result.is_ok(), "Test timed out during shutdown");
    assert!(result.unwrap().is_ok());

    assert_eq!(closed.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(coordinator.reason(), Some(ShutdownReason::LifecycleDone));
}

#[tokio::test]
async fn test_external_lifecycle_with_deadline() {
    let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    coordinator.track("quick", move |_| async move {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // A lifecycle that only ever ends through its deadline is still terminable.
    let trigger = Lifecycle::background().with_timeout(Duration::from_millis(50));

    let result = timeout(Duration::from_secs(2), coordinator.wait_on(&trigger)).await;
    assert!(result.is_ok(), "Test timed out during shutdown");
    assert!(result.unwrap().is_ok());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unterminable_lifecycle() {
    let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
    let result = timeout(
        Duration::from_millis(500),
        coordinator.wait_on(&Lifecycle::background()),
    )
    .await
    .expect("wait_on blocked");

    let err = result.unwrap_err();
    assert!(err.is_unterminable());
    assert_eq!(err.category(), "shutdown");
}

#[tokio::test]
async fn test_close_from_another_task() {
    let test_timeout = Duration::from_secs(2);
    let (lifecycle, coordinator) = ShutdownCoordinator::build(
        &Lifecycle::background(),
        Duration::from_millis(100),
        &[Signal::User1].into_iter().collect(),
    );

    let worker_stopped = Arc::new(AtomicUsize::new(0));
    let worker = tokio::spawn({
        let lifecycle = lifecycle.clone();
        let worker_stopped = Arc::clone(&worker_stopped);
        async move {
            lifecycle.done().await;
            worker_stopped.fetch_add(1, Ordering::SeqCst);
        }
    });

    let closer = coordinator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.close().await.unwrap();
    });

    let result = timeout(test_timeout, coordinator.wait()).await;
    assert!(result.is_ok(), "Test timed out during shutdown");
    assert!(result.unwrap().is_ok());

    worker.await.unwrap();
    assert_eq!(worker_stopped.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.reason(), Some(ShutdownReason::Requested));
    assert!(coordinator.stats().is_complete());
}
