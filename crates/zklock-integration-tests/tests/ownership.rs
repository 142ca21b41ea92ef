//! Owner-token gating of release.

use std::time::Duration;

use zklock_api::{Lock, LockContext, LockLevel, PERSISTENT_MODE};
use zklock_integration_tests::Harness;
use zklock_zk::{SessionState, ZkClient};

#[tokio::test]
async fn test_foreign_context_cannot_release_temporary_lock() {
    let harness = Harness::start("owners").await;
    let owner = LockContext::new();
    let thief = LockContext::new();
    let lock = Lock::new("report", vec![], LockLevel::Global);

    assert!(harness.api.try_lock(&owner, &lock).await.unwrap());
    assert!(!harness.api.unlock(&thief, &lock).await.unwrap());
    // still held by the owner
    assert!(!harness.api.try_lock(&thief, &lock).await.unwrap());
    assert!(harness.api.unlock(&owner, &lock).await.unwrap());
}

#[tokio::test]
async fn test_unlock_is_idempotent() {
    let harness = Harness::start("idempotent").await;
    let ctx = LockContext::new();
    let lock = Lock::new("report", vec![], LockLevel::Application);

    assert!(harness.api.try_lock(&ctx, &lock).await.unwrap());
    assert!(harness.api.unlock(&ctx, &lock).await.unwrap());
    assert!(!harness.api.unlock(&ctx, &lock).await.unwrap());
}

#[tokio::test]
async fn test_unlock_without_acquire_returns_false() {
    let harness = Harness::start("never-held").await;
    let lock = Lock::new("ghost", vec![], LockLevel::Server);
    assert!(!harness.api.unlock(&LockContext::new(), &lock).await.unwrap());
}

#[tokio::test]
async fn test_persistent_lock_released_by_any_context() {
    let harness = Harness::start("admin").await;
    let owner = LockContext::new();
    let other = LockContext::new();
    let lock = Lock::with_mode("maintenance", vec![], LockLevel::Global, PERSISTENT_MODE);

    assert!(harness.api.try_lock(&owner, &lock).await.unwrap());
    assert!(harness.api.unlock(&other, &lock).await.unwrap());
    assert!(harness.api.try_lock(&other, &lock).await.unwrap());
}

#[tokio::test]
async fn test_persistent_lock_survives_session_expiry() {
    let harness = Harness::start("durable").await;
    let ctx = LockContext::new();
    let persistent = Lock::with_mode("migration", vec![], LockLevel::Global, PERSISTENT_MODE);
    let temporary = Lock::new("scratch", vec![], LockLevel::Global);

    assert!(harness.api.try_lock(&ctx, &persistent).await.unwrap());
    assert!(harness.api.try_lock(&ctx, &temporary).await.unwrap());

    harness.zk.expire_session();
    tokio::time::timeout(Duration::from_secs(2), async {
        while harness.zk.state() != SessionState::Connected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never rebuilt");

    let session = harness.session();
    assert!(
        session
            .node_exists("/distributed_lock/migration")
            .await
            .unwrap()
    );
    assert!(!session.node_exists("/distributed_lock/scratch").await.unwrap());

    // persistent locks stay held across sessions until explicitly deleted
    assert!(!harness.api.try_lock(&LockContext::new(), &persistent).await.unwrap());
    assert!(harness.api.unlock(&LockContext::new(), &persistent).await.unwrap());
}
