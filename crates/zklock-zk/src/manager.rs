//! Lock acquisition and release engines.
//!
//! Acquisition rides entirely on the service's atomic create: the fast path
//! is a single create, the contention path is an existence watch plus a
//! bounded poll loop. No client-side bookkeeping participates in the mutual
//! exclusion; the loop only decides when to try again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use zklock_api::{DistributedLockManager, Lock, LockContext, LockLevel, Result};

use crate::client::{Acl, ExistsReply, NodeLifetime, ZkClient};
use crate::recovery::FaultOutcome;
use crate::session::SessionManager;

/// Remaining wait allowance for one bounded acquire attempt.
///
/// Remaining time is re-evaluated only after each wake, so an exhausted
/// budget is detected up to one poll interval late.
#[derive(Debug, Clone, Copy)]
struct WaitBudget {
    started: Instant,
    timeout_ms: i64,
}

impl WaitBudget {
    fn start(timeout_ms: i64) -> Self {
        Self {
            started: Instant::now(),
            timeout_ms,
        }
    }

    fn unbounded(&self) -> bool {
        self.timeout_ms < 0
    }

    fn remaining_ms(&self) -> i64 {
        self.timeout_ms
            .saturating_sub(self.started.elapsed().as_millis() as i64)
    }
}

/// Lock manager over one coordination session.
pub struct ZkLockManager {
    session: Arc<SessionManager>,
    interval: Duration,
}

impl ZkLockManager {
    pub fn new(session: Arc<SessionManager>) -> Self {
        let interval = Duration::from_millis(session.config().poll_interval_ms);
        Self { session, interval }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn app_lock(&self, ctx: &LockContext, lock: &Lock, timeout_ms: i64) -> Result<bool> {
        let path = self.session.resolver().app_lock_path(lock.id());
        self.acquire(ctx, lock, &path, timeout_ms).await
    }

    pub async fn server_lock(
        &self,
        ctx: &LockContext,
        lock: &Lock,
        timeout_ms: i64,
    ) -> Result<bool> {
        let path = self.session.resolver().server_lock_path(lock.id());
        self.acquire(ctx, lock, &path, timeout_ms).await
    }

    pub async fn global_lock(
        &self,
        ctx: &LockContext,
        lock: &Lock,
        timeout_ms: i64,
    ) -> Result<bool> {
        let path = self.session.resolver().global_lock_path(lock.id());
        self.acquire(ctx, lock, &path, timeout_ms).await
    }

    pub async fn app_unlock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        let path = self.session.resolver().app_lock_path(lock.id());
        self.release(ctx, lock, &path).await
    }

    pub async fn server_unlock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        let path = self.session.resolver().server_lock_path(lock.id());
        self.release(ctx, lock, &path).await
    }

    pub async fn global_unlock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        let path = self.session.resolver().global_lock_path(lock.id());
        self.release(ctx, lock, &path).await
    }

    async fn acquire(
        &self,
        ctx: &LockContext,
        lock: &Lock,
        path: &str,
        timeout_ms: i64,
    ) -> Result<bool> {
        let budget = WaitBudget::start(timeout_ms);
        if self.try_create(ctx, lock, path).await? {
            return Ok(true);
        }
        if timeout_ms == 0 {
            // try-lock semantics: report the contention immediately
            return Ok(false);
        }
        self.wait_for_node(ctx, lock, path, budget).await
    }

    /// One atomic create attempt. `Ok(false)` covers contention and any
    /// absorbed fault; the caller's loop decides whether to try again.
    async fn try_create(&self, ctx: &LockContext, lock: &Lock, path: &str) -> Result<bool> {
        let lifetime = if lock.is_persistent() {
            NodeLifetime::Persistent
        } else {
            NodeLifetime::Ephemeral
        };
        match self
            .session
            .client()
            .create(path, ctx.token(), Acl::Open, lifetime)
            .await
        {
            Ok(()) => {
                debug!(path, "lock acquired");
                Ok(true)
            }
            Err(err) => {
                match self.session.absorb_fault(path, err).await? {
                    FaultOutcome::Contention => trace!(path, "lock is held"),
                    FaultOutcome::Recovered => debug!(path, "recovered; will retry"),
                    FaultOutcome::Ignored => {}
                }
                Ok(false)
            }
        }
    }

    /// Contention path: park on a watch-or-interval cycle and retry the
    /// create after every wake. Between a wake and the next attempt another
    /// caller may win the node; the loop simply goes around again.
    async fn wait_for_node(
        &self,
        ctx: &LockContext,
        lock: &Lock,
        path: &str,
        budget: WaitBudget,
    ) -> Result<bool> {
        let mut watch = self.arm_watch(path).await?;

        if budget.unbounded() {
            loop {
                if self.try_create(ctx, lock, path).await? {
                    return Ok(true);
                }
                watch = self.next_wake(path, watch).await?;
            }
        }

        // the holder may have vanished between the losing create and the
        // watch arming; grab the node now instead of parking an interval
        let mut acquired = match &watch {
            Some(reply) if !reply.exists => self.try_create(ctx, lock, path).await?,
            _ => false,
        };
        while !acquired && budget.remaining_ms() >= 0 {
            watch = self.next_wake(path, watch).await?;
            acquired = self.try_create(ctx, lock, path).await?;
        }
        Ok(acquired)
    }

    /// Arm a one-shot existence watch at `path`. An absorbed arming fault
    /// downgrades the next cycle to a plain poll.
    async fn arm_watch(&self, path: &str) -> Result<Option<ExistsReply>> {
        match self.session.client().exists_watch(path).await {
            Ok(reply) => Ok(Some(reply)),
            Err(err) => {
                self.session.absorb_fault(path, err).await?;
                Ok(None)
            }
        }
    }

    /// Park until the watch fires or the poll interval elapses, whichever
    /// comes first, then re-arm for the next cycle.
    async fn next_wake(
        &self,
        path: &str,
        watch: Option<ExistsReply>,
    ) -> Result<Option<ExistsReply>> {
        match watch {
            Some(reply) => {
                tokio::select! {
                    event = reply.watch => match event {
                        Ok(ev) => trace!(path, ?ev, "woken by watch"),
                        Err(_) => debug!(path, "watch dropped; treating as a wake"),
                    },
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            None => tokio::time::sleep(self.interval).await,
        }
        self.arm_watch(path).await
    }

    /// Delete the lock node if this context may: persistent locks are
    /// deletable by anyone (deliberately, they model cross-session
    /// administrative locks); temporary locks only by the owner token that
    /// created them.
    async fn release(&self, ctx: &LockContext, lock: &Lock, path: &str) -> Result<bool> {
        let current = match self.session.client().get_data(path).await {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(path, "unable to read lock owner: {err}");
                self.session.absorb_fault(path, err).await?;
                None
            }
        };

        let owned = current.as_deref() == Some(ctx.token());
        if !lock.is_persistent() && !owned {
            return Ok(false);
        }
        match self.session.client().delete(path).await {
            Ok(()) => {
                debug!(path, "lock released");
                Ok(true)
            }
            Err(err) => {
                self.session.absorb_fault(path, err).await?;
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl DistributedLockManager for ZkLockManager {
    async fn try_lock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        self.lock(ctx, lock, 0).await
    }

    async fn lock(&self, ctx: &LockContext, lock: &Lock, timeout_ms: i64) -> Result<bool> {
        match lock.level() {
            LockLevel::Application => self.app_lock(ctx, lock, timeout_ms).await,
            LockLevel::Server => self.server_lock(ctx, lock, timeout_ms).await,
            LockLevel::Global => self.global_lock(ctx, lock, timeout_ms).await,
        }
    }

    async fn unlock(&self, ctx: &LockContext, lock: &Lock) -> Result<bool> {
        match lock.level() {
            LockLevel::Application => self.app_unlock(ctx, lock).await,
            LockLevel::Server => self.server_unlock(ctx, lock).await,
            LockLevel::Global => self.global_unlock(ctx, lock).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZkConfig;
    use crate::memory::MemoryZk;

    async fn manager(app: &str) -> (ZkLockManager, Arc<MemoryZk>) {
        let zk = Arc::new(MemoryZk::new());
        let config = ZkConfig::default()
            .with_app_name(app)
            .with_credential("super:secret")
            .with_poll_interval_ms(20);
        let session = SessionManager::init(config, zk.clone()).await.unwrap();
        (ZkLockManager::new(session), zk)
    }

    #[tokio::test]
    async fn test_try_lock_then_contention() {
        let (manager, _zk) = manager("app").await;
        let lock = Lock::new("job", vec![], LockLevel::Global);
        let first = LockContext::new();
        let second = LockContext::new();

        assert!(manager.try_lock(&first, &lock).await.unwrap());
        assert!(!manager.try_lock(&second, &lock).await.unwrap());
        assert!(manager.unlock(&first, &lock).await.unwrap());
        assert!(manager.try_lock(&second, &lock).await.unwrap());
    }

    #[tokio::test]
    async fn test_levels_do_not_collide() {
        let (manager, _zk) = manager("app").await;
        let ctx = LockContext::new();
        let global = Lock::new("job", vec![], LockLevel::Global);
        let app = Lock::new("job", vec![], LockLevel::Application);
        let server = Lock::new("job", vec![], LockLevel::Server);

        assert!(manager.try_lock(&ctx, &global).await.unwrap());
        assert!(manager.try_lock(&ctx, &app).await.unwrap());
        assert!(manager.try_lock(&ctx, &server).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_node_holds_owner_token() {
        let (manager, zk) = manager("app").await;
        let ctx = LockContext::new();
        let lock = Lock::new("job", b"descriptive payload".to_vec(), LockLevel::Global);

        assert!(manager.try_lock(&ctx, &lock).await.unwrap());
        let payload = zk.get_data("/distributed_lock/job").await.unwrap();
        assert_eq!(payload, ctx.token());
    }
}
