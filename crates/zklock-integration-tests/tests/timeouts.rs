//! Wait-budget accounting under contention. These suites run with a paused
//! clock, so the bounds are exact rather than wall-time approximations.

use std::time::Duration;

use tokio::time::Instant;
use zklock_api::{Lock, LockContext, LockLevel};
use zklock_integration_tests::Harness;
use zklock_zk::ZkConfig;

const INTERVAL_MS: u64 = 500;

async fn contended_harness() -> (Harness, LockContext, Lock) {
    let harness = Harness::with_config(
        ZkConfig::default()
            .with_app_name("timing")
            .with_credential("super:secret")
            .with_poll_interval_ms(INTERVAL_MS),
    )
    .await;
    let holder = LockContext::new();
    let lock = Lock::new("held-job", vec![], LockLevel::Global);
    assert!(harness.api.try_lock(&holder, &lock).await.unwrap());
    (harness, holder, lock)
}

#[tokio::test(start_paused = true)]
async fn test_try_lock_does_not_wait() {
    let (harness, _holder, lock) = contended_harness().await;
    let started = Instant::now();
    assert!(
        !harness
            .api
            .try_lock(&LockContext::new(), &lock)
            .await
            .unwrap()
    );
    assert!(started.elapsed() < Duration::from_millis(INTERVAL_MS));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_expires_within_one_interval_of_budget() {
    let (harness, _holder, lock) = contended_harness().await;
    let timeout_ms: i64 = 1_600;
    let started = Instant::now();
    let acquired = harness
        .api
        .lock(&LockContext::new(), &lock, timeout_ms)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(!acquired);
    assert!(
        elapsed >= Duration::from_millis(timeout_ms as u64),
        "timed out early: {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_millis(timeout_ms as u64 + INTERVAL_MS),
        "timed out more than one interval late: {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_watch_wakes_waiter_before_next_poll() {
    let (harness, holder, lock) = contended_harness().await;

    let api = harness.api.clone();
    let contended = lock.clone();
    let waiter = tokio::spawn(async move {
        let started = Instant::now();
        let acquired = api
            .lock(&LockContext::new(), &contended, 10_000)
            .await
            .unwrap();
        (acquired, started.elapsed())
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.api.unlock(&holder, &lock).await.unwrap());

    let (acquired, waited) = waiter.await.unwrap();
    assert!(acquired);
    assert!(
        waited < Duration::from_millis(INTERVAL_MS),
        "waiter slept through the delete notification: {waited:?}"
    );
}
