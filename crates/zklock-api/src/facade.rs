//! Caller-facing lock API.

use std::sync::Arc;

use tracing::debug;

use crate::context::LockContext;
use crate::error::Result;
use crate::lock::Lock;
use crate::manager::DistributedLockManager;

/// Facade over an injected lock manager.
///
/// Stateless per call; lock-level dispatch happens inside the manager.
/// Construct one per process and share it freely between workers, each of
/// which passes its own [`LockContext`].
pub struct DistributedLockApi {
    manager: Arc<dyn DistributedLockManager>,
}

impl DistributedLockApi {
    pub fn new(manager: Arc<dyn DistributedLockManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<dyn DistributedLockManager> {
        &self.manager
    }

    pub async fn try_lock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        debug!(id = lock.id(), "try_lock");
        self.manager.try_lock(ctx, lock).await
    }

    pub async fn lock(&self, ctx: &LockContext, lock: &Lock, timeout_ms: i64) -> Result<bool> {
        debug!(id = lock.id(), timeout_ms, "lock");
        self.manager.lock(ctx, lock, timeout_ms).await
    }

    pub async fn unlock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        debug!(id = lock.id(), "unlock");
        self.manager.unlock(ctx, lock).await
    }
}
