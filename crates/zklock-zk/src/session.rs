//! Session lifecycle for the coordination namespace.
//!
//! Owns the client connection. On init it bootstraps the root hierarchy,
//! registers this process's identity, applies the admin credential, and
//! starts two background tasks: one keeping the runtime debug flag live via
//! a re-armed one-shot watch, and one rebuilding the whole session when the
//! service reports it expired.
//!
//! The debug flag is an operator knob stored at `/config/debug`; setting it
//! to `true` with any namespace CLI turns on verbose contention logging.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};
use zklock_api::{LockError, Result};

use crate::auth;
use crate::client::{Acl, NodeLifetime, SessionEvent, SessionState, ZkClient, ZkError};
use crate::config::ZkConfig;
use crate::paths::{
    APP_ROOT, CONFIG_ROOT, DEBUG_NODE, GLOBAL_LOCK_ROOT, PathResolver, SERVER_ROOT,
};
use crate::recovery;

/// Payload tagging the root nodes this manager creates.
pub(crate) const MANAGER_TAG: &[u8] = b"SessionManager";

/// Bound on waiting for the first connected notification.
const CONNECT_WAIT: Duration = Duration::from_secs(10);

/// Backoff between retries of a failed debug-flag watch.
const DEBUG_WATCH_RETRY: Duration = Duration::from_secs(1);

/// Session lifecycle manager: one per process, shared by reference.
///
/// Construct with [`SessionManager::init`], wire into a
/// [`ZkLockManager`](crate::manager::ZkLockManager), and [`close`]
/// (SessionManager::close) on shutdown. After a failed init there is no
/// live session; callers must initialize a fresh manager.
pub struct SessionManager {
    config: ZkConfig,
    client: Arc<dyn ZkClient>,
    resolver: PathResolver,
    admin_acl: Acl,
    debug: AtomicBool,
    rebuild_gate: Mutex<()>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("admin_acl", &self.admin_acl)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Validate the configuration, connect, and run the full bootstrap:
    /// auth, root hierarchy, registration, debug flag.
    pub async fn init(config: ZkConfig, client: Arc<dyn ZkClient>) -> Result<Arc<Self>> {
        config.validate()?;
        let admin_acl = Acl::Digest(auth::generate_digest(&config.admin_credential)?);
        let resolver = PathResolver::new(&config.app_name);
        info!(
            endpoint = %config.endpoint,
            app = %config.app_name,
            server = resolver.server_ip(),
            "initializing coordination session"
        );

        let manager = Arc::new(Self {
            config,
            client,
            resolver,
            admin_acl,
            debug: AtomicBool::new(false),
            rebuild_gate: Mutex::new(()),
        });
        manager.bootstrap().await?;
        manager.spawn_session_listener();
        manager.spawn_debug_watch();
        Ok(manager)
    }

    pub fn client(&self) -> &Arc<dyn ZkClient> {
        &self.client
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ZkConfig {
        &self.config
    }

    /// Live value of the namespace-driven debug flag.
    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Close the session if it is still connected.
    pub async fn close(&self) -> Result<()> {
        if self.client.state() == SessionState::Connected {
            self.client
                .close()
                .await
                .map_err(|e| LockError::connection(format!("close failed: {e}")))?;
        }
        Ok(())
    }

    /// Read a node's payload; `None` when the node does not exist.
    pub async fn node_payload(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.client.get_data(path).await {
            Ok(data) => Ok(Some(data)),
            Err(ZkError::NoNode(_)) => Ok(None),
            Err(err) => Err(recovery::surface(path, &err)),
        }
    }

    pub async fn node_exists(&self, path: &str) -> Result<bool> {
        self.client
            .exists(path)
            .await
            .map_err(|err| recovery::surface(path, &err))
    }

    /// One full connect + bootstrap pass.
    async fn bootstrap(&self) -> Result<()> {
        self.await_connected().await?;
        self.apply_auth().await?;
        self.ensure_roots().await?;
        self.init_debug_flag().await?;
        self.register_server().await?;
        self.register_app().await?;
        Ok(())
    }

    /// Begin the session and wait, bounded, for the first connected
    /// notification.
    async fn await_connected(&self) -> Result<()> {
        let mut events = self.client.subscribe_session();
        self.client
            .connect()
            .await
            .map_err(|e| LockError::connection(format!("connect failed: {e}")))?;
        if self.client.state() == SessionState::Connected {
            return Ok(());
        }

        let connected = tokio::time::timeout(CONNECT_WAIT, async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Connected) => break true,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break false,
                }
            }
        })
        .await;
        match connected {
            Ok(true) => Ok(()),
            _ => Err(LockError::connection(format!(
                "no connected notification from {} within {:?}",
                self.config.endpoint, CONNECT_WAIT
            ))),
        }
    }

    /// Register the admin credential on the live session.
    pub(crate) async fn apply_auth(&self) -> Result<()> {
        self.client
            .add_auth(auth::DIGEST_SCHEME, self.config.admin_credential.as_bytes())
            .await
            .map_err(|e| LockError::connection(format!("authentication failed: {e}")))
    }

    async fn ensure_roots(&self) -> Result<()> {
        for root in [CONFIG_ROOT, SERVER_ROOT, APP_ROOT, GLOBAL_LOCK_ROOT] {
            self.ensure_root(root).await?;
        }
        Ok(())
    }

    pub(crate) async fn ensure_root(&self, root: &str) -> Result<bool> {
        self.ensure_node(root, MANAGER_TAG, self.admin_acl.clone())
            .await
    }

    /// Create `path` if absent. Returns whether this call created it;
    /// losing a creation race to another process counts as "not created".
    pub(crate) async fn ensure_node(&self, path: &str, payload: &[u8], acl: Acl) -> Result<bool> {
        let exists = self
            .client
            .exists(path)
            .await
            .map_err(|err| recovery::surface(path, &err))?;
        if exists {
            return Ok(false);
        }
        match self
            .client
            .create(path, payload, acl, NodeLifetime::Persistent)
            .await
        {
            Ok(()) => {
                debug!(path, "created node");
                Ok(true)
            }
            Err(ZkError::NodeExists(_)) => Ok(false),
            Err(err) => Err(recovery::surface(path, &err)),
        }
    }

    /// Register this server's address under the server root, with the
    /// hostname as payload.
    pub(crate) async fn register_server(&self) -> Result<bool> {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string());
        self.ensure_node(
            &self.resolver.server_lock_root(),
            host.as_bytes(),
            self.admin_acl.clone(),
        )
        .await
    }

    /// Register the application name under the application root.
    pub(crate) async fn register_app(&self) -> Result<bool> {
        let app = self.resolver.app_name().to_string();
        self.ensure_node(
            &self.resolver.app_lock_root(),
            app.as_bytes(),
            self.admin_acl.clone(),
        )
        .await
    }

    /// Seed the debug flag: create the node with `false` when missing,
    /// otherwise load the current value.
    async fn init_debug_flag(&self) -> Result<()> {
        let path = self.resolver.config_path(DEBUG_NODE);
        let exists = self
            .client
            .exists(&path)
            .await
            .map_err(|err| recovery::surface(&path, &err))?;
        if exists {
            match self.client.get_data(&path).await {
                Ok(data) => self.set_debug(&data),
                Err(err) => warn!(path = %path, "unable to read debug flag: {err}"),
            }
        } else {
            // open rule so operators can flip it without the admin credential
            match self
                .client
                .create(&path, b"false", Acl::Open, NodeLifetime::Persistent)
                .await
            {
                Ok(()) | Err(ZkError::NodeExists(_)) => {}
                Err(err) => return Err(recovery::surface(&path, &err)),
            }
            self.set_debug(b"false");
        }
        Ok(())
    }

    fn set_debug(&self, payload: &[u8]) {
        let enabled = payload.eq_ignore_ascii_case(b"true");
        self.debug.store(enabled, Ordering::Relaxed);
        debug!(enabled, "debug flag updated");
    }

    /// Rebuild the session after an expiry notification. At most one
    /// rebuild runs at a time; late arrivals find the session already
    /// connected and return without another bootstrap.
    pub(crate) async fn rebuild(&self) -> Result<()> {
        let _gate = self.rebuild_gate.lock().await;
        if self.client.state() == SessionState::Connected {
            debug!("session already rebuilt");
            return Ok(());
        }
        self.bootstrap().await
    }

    /// Bounded reconnect loop driven by the fault classifier.
    pub(crate) async fn reconnect(&self) -> Result<()> {
        let _gate = self.rebuild_gate.lock().await;
        let mut attempt = 0;
        while attempt < self.config.reconnect_attempts
            && self.client.state() != SessionState::Connected
        {
            attempt += 1;
            info!(attempt, "reconnecting to the coordination service");
            if let Err(e) = self.bootstrap().await {
                warn!(attempt, "reconnect attempt failed: {e}");
            }
        }
        if self.client.state() == SessionState::Connected {
            Ok(())
        } else {
            Err(LockError::connection(
                "session is broken and reconnecting failed",
            ))
        }
    }

    /// Watch session notifications; an expiry triggers a transparent
    /// rebuild of the whole bootstrap sequence.
    fn spawn_session_listener(self: &Arc<Self>) {
        let mut events = self.client.subscribe_session();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Expired) => {
                        let Some(manager) = weak.upgrade() else { break };
                        warn!("session expired; rebuilding");
                        match manager.rebuild().await {
                            Ok(()) => info!("session rebuilt"),
                            Err(e) => error!("failed to rebuild session: {e}"),
                        }
                    }
                    Ok(SessionEvent::Closed) => break,
                    Ok(SessionEvent::Connected) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Keep the debug flag live. One-shot watches fire at most once, so
    /// persistent observation is an explicit loop: arm, read, park, re-arm.
    fn spawn_debug_watch(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let Some(manager) = weak.upgrade() else { break };
                let path = manager.resolver.config_path(DEBUG_NODE);
                let reply = match manager.client.exists_watch(&path).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!(path = %path, "debug-flag watch unavailable: {e}");
                        drop(manager);
                        tokio::time::sleep(DEBUG_WATCH_RETRY).await;
                        continue;
                    }
                };
                if reply.exists {
                    match manager.client.get_data(&path).await {
                        Ok(data) => manager.set_debug(&data),
                        Err(e) => debug!(path = %path, "unable to read debug flag: {e}"),
                    }
                }
                // do not pin the manager while parked on the watch
                drop(manager);
                if reply.watch.await.is_err() {
                    tokio::time::sleep(DEBUG_WATCH_RETRY).await;
                }
            }
        });
    }
}
