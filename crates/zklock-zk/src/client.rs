//! Coordination-service client contract.
//!
//! The lock engines consume the namespace through this minimal contract:
//! atomic create with a chosen lifetime, unversioned delete, existence
//! checks with optional one-shot watches, payload reads, session-level
//! authentication, and session-state notifications. The service's wire
//! protocol and consensus live behind this boundary.

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLifetime {
    /// Removed by the service when the creating session ends.
    Ephemeral,
    /// Survives session loss; requires explicit deletion.
    Persistent,
}

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Closed,
}

/// Session-level notifications delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Expired,
    Closed,
}

/// A change observed by a one-shot watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Created,
    Deleted,
    DataChanged,
}

/// One-shot watch handle; resolves on the next change at the watched path.
/// Persistent observation requires re-arming after every firing.
pub type Watch = oneshot::Receiver<WatchEvent>;

/// Access rule attached to a node at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acl {
    /// Anyone may read, write, and delete.
    Open,
    /// Full rights only for the given digested credential (`id:digest`).
    Digest(String),
}

/// Coded faults from the coordination service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ZkError {
    #[error("connection lost")]
    ConnectionLoss,
    #[error("session expired")]
    SessionExpired,
    #[error("session moved")]
    SessionMoved,
    #[error("no node: {0}")]
    NoNode(String),
    #[error("node exists: {0}")]
    NodeExists(String),
    #[error("not authorized: {0}")]
    NoAuth(String),
    #[error("coordination fault: {0}")]
    Other(String),
}

pub type ZkResult<T> = std::result::Result<T, ZkError>;

/// Reply from an existence check that also armed a watch.
#[derive(Debug)]
pub struct ExistsReply {
    pub exists: bool,
    pub watch: Watch,
}

/// Minimal client contract required from the coordination service.
#[async_trait]
pub trait ZkClient: Send + Sync {
    /// Begin (or re-establish) the session. Completion is also signaled via
    /// [`subscribe_session`](Self::subscribe_session).
    async fn connect(&self) -> ZkResult<()>;

    /// End the session, releasing its ephemeral nodes.
    async fn close(&self) -> ZkResult<()>;

    fn state(&self) -> SessionState;

    /// Subscribe to session-state notifications.
    fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent>;

    /// Register an authentication credential on the live session.
    async fn add_auth(&self, scheme: &str, credential: &[u8]) -> ZkResult<()>;

    /// Atomically create `path` with the given payload, access rule, and
    /// lifetime. Fails with [`ZkError::NodeExists`] when the path is taken.
    async fn create(
        &self,
        path: &str,
        payload: &[u8],
        acl: Acl,
        lifetime: NodeLifetime,
    ) -> ZkResult<()>;

    /// Delete `path` with no version check.
    async fn delete(&self, path: &str) -> ZkResult<()>;

    /// Existence check without a watch.
    async fn exists(&self, path: &str) -> ZkResult<bool>;

    /// Existence check that arms a one-shot watch for the next change at
    /// `path`, whether or not the node currently exists.
    async fn exists_watch(&self, path: &str) -> ZkResult<ExistsReply>;

    /// Read the payload at `path`.
    async fn get_data(&self, path: &str) -> ZkResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ZkError::ConnectionLoss.to_string(), "connection lost");
        assert_eq!(
            ZkError::NodeExists("/distributed_lock/a".to_string()).to_string(),
            "node exists: /distributed_lock/a"
        );
        assert_eq!(
            ZkError::NoAuth("/config".to_string()).to_string(),
            "not authorized: /config"
        );
    }
}
