//! Fault classification and self-healing.
//!
//! Every fault from the coordination service carries a code; the classifier
//! maps codes onto a fixed set of reactions, and the recovery driver runs
//! the matching one against the session. A caller sees an error only when
//! recovery itself failed.

use tracing::{error, info, warn};
use zklock_api::{LockError, Result};

use crate::client::ZkError;
use crate::paths::{APP_ROOT, GLOBAL_LOCK_ROOT, SERVER_ROOT};
use crate::session::SessionManager;

/// Reaction class for a coordination fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Broken transport or session; reconnect.
    Session,
    /// A node is missing; recreate the root subtree when it is ours.
    MissingNode,
    /// Rights missing; re-authenticate.
    Auth,
    /// Benign lock contention.
    Contention,
    /// Everything else; log and treat as a wake.
    Unhandled,
}

pub fn classify(err: &ZkError) -> FaultClass {
    match err {
        ZkError::ConnectionLoss | ZkError::SessionExpired | ZkError::SessionMoved => {
            FaultClass::Session
        }
        ZkError::NoNode(_) => FaultClass::MissingNode,
        ZkError::NoAuth(_) => FaultClass::Auth,
        ZkError::NodeExists(_) => FaultClass::Contention,
        ZkError::Other(_) => FaultClass::Unhandled,
    }
}

/// What the caller should do after a fault was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The expected result of lock contention.
    Contention,
    /// Local recovery ran; the operation may be retried.
    Recovered,
    /// Nothing to recover; treat as a spurious wake.
    Ignored,
}

/// Map a fault that recovery could not absorb to the error surfaced to
/// callers.
pub(crate) fn surface(path: &str, err: &ZkError) -> LockError {
    match err {
        ZkError::NoNode(_) => LockError::NamespaceCorruption {
            path: path.to_string(),
        },
        ZkError::NoAuth(_) => LockError::Unauthorized {
            path: path.to_string(),
        },
        _ => LockError::connection(err.to_string()),
    }
}

impl SessionManager {
    /// Absorb a coordination fault observed at `path`, driving the matching
    /// recovery action.
    pub(crate) async fn absorb_fault(&self, path: &str, err: ZkError) -> Result<FaultOutcome> {
        match classify(&err) {
            FaultClass::Session => {
                warn!(path, "connection/session is broken; reconnecting");
                self.reconnect().await?;
                Ok(FaultOutcome::Recovered)
            }
            FaultClass::MissingNode => {
                if self.recreate_root_for(path).await? {
                    Ok(FaultOutcome::Recovered)
                } else {
                    error!(path, "missing node outside the lock roots: {err}");
                    Ok(FaultOutcome::Ignored)
                }
            }
            FaultClass::Auth => {
                error!(path, "unexpected no-auth; re-applying the admin credential");
                match self.apply_auth().await {
                    Ok(()) => Ok(FaultOutcome::Recovered),
                    Err(_) => Err(LockError::Unauthorized {
                        path: path.to_string(),
                    }),
                }
            }
            FaultClass::Contention => {
                // failing to take a held lock is the normal case; only worth
                // noise when the operator turned the debug flag on
                if self.debug_enabled() {
                    warn!(path, "node exists");
                }
                Ok(FaultOutcome::Contention)
            }
            FaultClass::Unhandled => {
                error!(path, "unhandled coordination fault: {err}");
                Ok(FaultOutcome::Ignored)
            }
        }
    }

    /// Recreate the missing root subtree `path` belongs to, registration
    /// node included. Returns false when `path` is under none of the lock
    /// roots.
    async fn recreate_root_for(&self, path: &str) -> Result<bool> {
        let recreated = if path.starts_with(&self.resolver().server_lock_root()) {
            warn!(path, "server root is gone; the namespace was tampered with");
            self.ensure_root(SERVER_ROOT).await?;
            self.register_server().await?;
            true
        } else if path.starts_with(&self.resolver().app_lock_root()) {
            warn!(path, "application root is gone; the namespace was tampered with");
            self.ensure_root(APP_ROOT).await?;
            self.register_app().await?;
            true
        } else if path.starts_with(GLOBAL_LOCK_ROOT) {
            warn!(path, "global lock root is gone; the namespace was tampered with");
            self.ensure_root(GLOBAL_LOCK_ROOT).await?;
            true
        } else {
            false
        };
        if recreated {
            info!(path, "recreated the root subtree");
        }
        Ok(recreated)
    }
}
