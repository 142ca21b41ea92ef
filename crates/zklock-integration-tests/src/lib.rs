//! Shared harness for the zklock end-to-end suites.
//!
//! Every suite runs the full stack (facade, lock manager, session manager)
//! against the in-process namespace backend, so nothing external has to be
//! stood up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use zklock_api::DistributedLockApi;
use zklock_zk::{
    Acl, ExistsReply, MemoryZk, NodeLifetime, SessionEvent, SessionManager, SessionState,
    ZkClient, ZkConfig, ZkError, ZkLockManager, ZkResult,
};

/// Install a test subscriber once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A fully wired lock stack over one in-process namespace.
pub struct Harness {
    pub api: Arc<DistributedLockApi>,
    pub manager: Arc<ZkLockManager>,
    pub zk: Arc<MemoryZk>,
}

impl Harness {
    /// Stack with a short poll interval suitable for tests.
    pub async fn start(app_name: &str) -> Self {
        Self::with_config(
            ZkConfig::default()
                .with_app_name(app_name)
                .with_credential("super:secret")
                .with_poll_interval_ms(50),
        )
        .await
    }

    pub async fn with_config(config: ZkConfig) -> Self {
        let zk = Arc::new(MemoryZk::new());
        let session = SessionManager::init(config, zk.clone())
            .await
            .expect("session init");
        let manager = Arc::new(ZkLockManager::new(session));
        let api = Arc::new(DistributedLockApi::new(manager.clone()));
        Self { api, manager, zk }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.manager.session()
    }
}

/// Namespace client with a kill switch: once killed, every operation and
/// every reconnect attempt fails, modeling a service that stays down.
pub struct KillableZk {
    inner: Arc<MemoryZk>,
    dead: AtomicBool,
}

impl KillableZk {
    pub fn new(inner: Arc<MemoryZk>) -> Self {
        Self {
            inner,
            dead: AtomicBool::new(false),
        }
    }

    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> ZkResult<()> {
        if self.dead.load(Ordering::SeqCst) {
            Err(ZkError::ConnectionLoss)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ZkClient for KillableZk {
    async fn connect(&self) -> ZkResult<()> {
        self.check()?;
        self.inner.connect().await
    }

    async fn close(&self) -> ZkResult<()> {
        self.inner.close().await
    }

    fn state(&self) -> SessionState {
        if self.dead.load(Ordering::SeqCst) {
            SessionState::Closed
        } else {
            self.inner.state()
        }
    }

    fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.subscribe_session()
    }

    async fn add_auth(&self, scheme: &str, credential: &[u8]) -> ZkResult<()> {
        self.check()?;
        self.inner.add_auth(scheme, credential).await
    }

    async fn create(
        &self,
        path: &str,
        payload: &[u8],
        acl: Acl,
        lifetime: NodeLifetime,
    ) -> ZkResult<()> {
        self.check()?;
        self.inner.create(path, payload, acl, lifetime).await
    }

    async fn delete(&self, path: &str) -> ZkResult<()> {
        self.check()?;
        self.inner.delete(path).await
    }

    async fn exists(&self, path: &str) -> ZkResult<bool> {
        self.check()?;
        self.inner.exists(path).await
    }

    async fn exists_watch(&self, path: &str) -> ZkResult<ExistsReply> {
        self.check()?;
        self.inner.exists_watch(path).await
    }

    async fn get_data(&self, path: &str) -> ZkResult<Vec<u8>> {
        self.check()?;
        self.inner.get_data(path).await
    }
}
