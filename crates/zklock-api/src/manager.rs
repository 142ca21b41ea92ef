//! Backend contract for lock managers.

use async_trait::async_trait;

use crate::context::LockContext;
use crate::error::Result;
use crate::lock::Lock;

/// Contract implemented by coordination-namespace lock backends.
///
/// All operations return `Ok(false)` for ordinary contention outcomes;
/// an `Err` always means the coordination infrastructure failed and local
/// recovery did not resolve it.
#[async_trait]
pub trait DistributedLockManager: Send + Sync {
    /// Attempt to obtain `lock` without waiting.
    async fn try_lock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool>;

    /// Obtain `lock`, waiting up to `timeout_ms` milliseconds.
    ///
    /// `timeout_ms == 0` behaves as [`try_lock`](Self::try_lock); a negative
    /// timeout waits without bound.
    async fn lock(&self, ctx: &LockContext, lock: &Lock, timeout_ms: i64) -> Result<bool>;

    /// Release `lock`. Returns `false` when nothing was released: the lock
    /// was already gone, or it is temporary and owned by another context.
    async fn unlock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool>;
}
