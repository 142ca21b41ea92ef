//! In-process coordination namespace.
//!
//! Implements the [`ZkClient`] contract against process-local state. The
//! test suites run the lock engines against it with no service to stand
//! up, and single-process deployments can use it to get the lock API
//! without external infrastructure.
//!
//! Inherent methods not on the contract ([`MemoryZk::set_data`],
//! [`MemoryZk::expire_session`], [`MemoryZk::force_delete`]) model what an
//! operator or the service itself can do out-of-band: flip config nodes,
//! expire the session, tamper with the tree.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::trace;

use crate::client::{
    Acl, ExistsReply, NodeLifetime, SessionEvent, SessionState, WatchEvent, ZkClient, ZkError,
    ZkResult,
};

struct Node {
    payload: Vec<u8>,
    acl: Acl,
    lifetime: NodeLifetime,
}

pub struct MemoryZk {
    nodes: DashMap<String, Node>,
    watches: Mutex<HashMap<String, Vec<oneshot::Sender<WatchEvent>>>>,
    state: Mutex<SessionState>,
    auths: Mutex<HashSet<String>>,
    epoch: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl MemoryZk {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            nodes: DashMap::new(),
            watches: Mutex::new(HashMap::new()),
            state: Mutex::new(SessionState::Connecting),
            auths: Mutex::new(HashSet::new()),
            epoch: AtomicU64::new(0),
            events,
        }
    }

    /// Session epoch, bumped on every (re)connect.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Overwrite a node's payload, firing data-change watches. This is the
    /// operator-side knob (e.g. flipping `/config/debug`).
    pub fn set_data(&self, path: &str, payload: &[u8]) -> ZkResult<()> {
        let acl = self
            .nodes
            .get(path)
            .map(|node| node.acl.clone())
            .ok_or_else(|| ZkError::NoNode(path.to_string()))?;
        self.check_access(path, &acl)?;
        if let Some(mut node) = self.nodes.get_mut(path) {
            node.payload = payload.to_vec();
        }
        self.fire(path, WatchEvent::DataChanged);
        Ok(())
    }

    /// Expire the session: ephemeral nodes are reaped, registered
    /// credentials and pending watches are dropped, and subscribers are
    /// notified.
    pub fn expire_session(&self) {
        *self.state.lock() = SessionState::Closed;
        self.auths.lock().clear();
        self.reap_ephemeral();
        self.watches.lock().clear();
        let _ = self.events.send(SessionEvent::Expired);
    }

    /// Delete a node and its whole subtree, bypassing access rules.
    /// Models out-of-band tampering with the namespace.
    pub fn force_delete(&self, path: &str) {
        let prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key == path || key.starts_with(&prefix))
            .collect();
        for key in doomed {
            self.nodes.remove(&key);
            self.fire(&key, WatchEvent::Deleted);
        }
    }

    fn ensure_connected(&self) -> ZkResult<()> {
        match *self.state.lock() {
            SessionState::Connected => Ok(()),
            _ => Err(ZkError::ConnectionLoss),
        }
    }

    fn check_access(&self, path: &str, acl: &Acl) -> ZkResult<()> {
        match acl {
            Acl::Open => Ok(()),
            Acl::Digest(digest) => {
                if self.auths.lock().contains(digest) {
                    Ok(())
                } else {
                    Err(ZkError::NoAuth(path.to_string()))
                }
            }
        }
    }

    fn arm_watch(&self, path: &str) -> oneshot::Receiver<WatchEvent> {
        let (tx, rx) = oneshot::channel();
        self.watches
            .lock()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn fire(&self, path: &str, event: WatchEvent) {
        let senders = self.watches.lock().remove(path);
        if let Some(senders) = senders {
            trace!(path, ?event, "firing {} watch(es)", senders.len());
            for tx in senders {
                let _ = tx.send(event);
            }
        }
    }

    fn reap_ephemeral(&self) {
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().lifetime == NodeLifetime::Ephemeral)
            .map(|entry| entry.key().clone())
            .collect();
        for key in doomed {
            self.nodes.remove(&key);
            self.fire(&key, WatchEvent::Deleted);
        }
    }
}

impl Default for MemoryZk {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_path(path: &str) -> ZkResult<()> {
    if path.len() > 1 && path.starts_with('/') && !path.ends_with('/') {
        Ok(())
    } else {
        Err(ZkError::Other(format!("invalid path: {path}")))
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "",
        Some(idx) => &path[..idx],
    }
}

#[async_trait]
impl ZkClient for MemoryZk {
    async fn connect(&self) -> ZkResult<()> {
        let mut state = self.state.lock();
        if *state == SessionState::Connected {
            return Ok(());
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *state = SessionState::Connected;
        drop(state);
        let _ = self.events.send(SessionEvent::Connected);
        Ok(())
    }

    async fn close(&self) -> ZkResult<()> {
        *self.state.lock() = SessionState::Closed;
        self.auths.lock().clear();
        self.reap_ephemeral();
        self.watches.lock().clear();
        let _ = self.events.send(SessionEvent::Closed);
        Ok(())
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn add_auth(&self, scheme: &str, credential: &[u8]) -> ZkResult<()> {
        self.ensure_connected()?;
        if scheme != crate::auth::DIGEST_SCHEME {
            return Err(ZkError::Other(format!("unknown auth scheme: {scheme}")));
        }
        let credential = std::str::from_utf8(credential)
            .map_err(|_| ZkError::Other("credential is not utf-8".to_string()))?;
        let digest = crate::auth::generate_digest(credential)
            .map_err(|e| ZkError::Other(e.to_string()))?;
        self.auths.lock().insert(digest);
        Ok(())
    }

    async fn create(
        &self,
        path: &str,
        payload: &[u8],
        acl: Acl,
        lifetime: NodeLifetime,
    ) -> ZkResult<()> {
        self.ensure_connected()?;
        validate_path(path)?;

        let parent = parent_of(path);
        if !parent.is_empty() {
            let parent_acl = self
                .nodes
                .get(parent)
                .map(|node| node.acl.clone())
                .ok_or_else(|| ZkError::NoNode(path.to_string()))?;
            self.check_access(path, &parent_acl)?;
        }

        match self.nodes.entry(path.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ZkError::NodeExists(path.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Node {
                    payload: payload.to_vec(),
                    acl,
                    lifetime,
                });
            }
        }
        self.fire(path, WatchEvent::Created);
        Ok(())
    }

    async fn delete(&self, path: &str) -> ZkResult<()> {
        self.ensure_connected()?;
        let acl = self
            .nodes
            .get(path)
            .map(|node| node.acl.clone())
            .ok_or_else(|| ZkError::NoNode(path.to_string()))?;
        self.check_access(path, &acl)?;
        self.nodes.remove(path);
        self.fire(path, WatchEvent::Deleted);
        Ok(())
    }

    async fn exists(&self, path: &str) -> ZkResult<bool> {
        self.ensure_connected()?;
        Ok(self.nodes.contains_key(path))
    }

    async fn exists_watch(&self, path: &str) -> ZkResult<ExistsReply> {
        self.ensure_connected()?;
        let watch = self.arm_watch(path);
        Ok(ExistsReply {
            exists: self.nodes.contains_key(path),
            watch,
        })
    }

    async fn get_data(&self, path: &str) -> ZkResult<Vec<u8>> {
        self.ensure_connected()?;
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| ZkError::NoNode(path.to_string()))?;
        self.check_access(path, &node.acl)?;
        Ok(node.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth;

    async fn connected() -> MemoryZk {
        let zk = MemoryZk::new();
        zk.connect().await.unwrap();
        zk
    }

    #[tokio::test]
    async fn test_create_read_delete() {
        let zk = connected().await;
        zk.create("/a", b"one", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        assert!(zk.exists("/a").await.unwrap());
        assert_eq!(zk.get_data("/a").await.unwrap(), b"one");
        zk.delete("/a").await.unwrap();
        assert!(!zk.exists("/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let zk = connected().await;
        zk.create("/a", b"", Acl::Open, NodeLifetime::Ephemeral)
            .await
            .unwrap();
        let err = zk
            .create("/a", b"", Acl::Open, NodeLifetime::Ephemeral)
            .await
            .unwrap_err();
        assert!(matches!(err, ZkError::NodeExists(_)));
    }

    #[tokio::test]
    async fn test_create_requires_parent() {
        let zk = connected().await;
        let err = zk
            .create("/a/b", b"", Acl::Open, NodeLifetime::Ephemeral)
            .await
            .unwrap_err();
        assert!(matches!(err, ZkError::NoNode(_)));
    }

    #[tokio::test]
    async fn test_disconnected_session_faults() {
        let zk = MemoryZk::new();
        let err = zk.exists("/a").await.unwrap_err();
        assert!(matches!(err, ZkError::ConnectionLoss));
    }

    #[tokio::test]
    async fn test_watch_fires_on_delete() {
        let zk = connected().await;
        zk.create("/a", b"", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        let reply = zk.exists_watch("/a").await.unwrap();
        assert!(reply.exists);
        zk.delete("/a").await.unwrap();
        assert_eq!(reply.watch.await.unwrap(), WatchEvent::Deleted);
    }

    #[tokio::test]
    async fn test_watch_fires_on_create_of_absent_node() {
        let zk = connected().await;
        let reply = zk.exists_watch("/a").await.unwrap();
        assert!(!reply.exists);
        zk.create("/a", b"", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        assert_eq!(reply.watch.await.unwrap(), WatchEvent::Created);
    }

    #[tokio::test]
    async fn test_expiry_reaps_only_ephemeral_nodes() {
        let zk = connected().await;
        zk.create("/keep", b"", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        zk.create("/gone", b"", Acl::Open, NodeLifetime::Ephemeral)
            .await
            .unwrap();
        zk.expire_session();
        zk.connect().await.unwrap();
        assert!(zk.exists("/keep").await.unwrap());
        assert!(!zk.exists("/gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_epoch_increments_per_session() {
        let zk = connected().await;
        let first = zk.epoch();
        zk.expire_session();
        zk.connect().await.unwrap();
        assert_eq!(zk.epoch(), first + 1);
    }

    #[tokio::test]
    async fn test_digest_acl_enforced() {
        let zk = connected().await;
        let digest = auth::generate_digest("super:secret").unwrap();
        zk.create("/admin", b"", Acl::Digest(digest), NodeLifetime::Persistent)
            .await
            .unwrap();

        let err = zk.delete("/admin").await.unwrap_err();
        assert!(matches!(err, ZkError::NoAuth(_)));

        zk.add_auth(auth::DIGEST_SCHEME, b"super:secret")
            .await
            .unwrap();
        zk.delete("/admin").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_data_fires_data_watch() {
        let zk = connected().await;
        zk.create("/flag", b"false", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        let reply = zk.exists_watch("/flag").await.unwrap();
        zk.set_data("/flag", b"true").unwrap();
        assert_eq!(reply.watch.await.unwrap(), WatchEvent::DataChanged);
        assert_eq!(zk.get_data("/flag").await.unwrap(), b"true");
    }

    #[tokio::test]
    async fn test_force_delete_removes_subtree() {
        let zk = connected().await;
        zk.create("/root", b"", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        zk.create("/root/child", b"", Acl::Open, NodeLifetime::Persistent)
            .await
            .unwrap();
        zk.force_delete("/root");
        assert!(!zk.exists("/root").await.unwrap());
        assert!(!zk.exists("/root/child").await.unwrap());
    }
}
