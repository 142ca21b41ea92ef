//! Per-worker owner token.

use uuid::Uuid;

/// Identifies one concurrent lock-holding unit of work.
///
/// Create one context per worker (thread, task) and pass it to every
/// acquire and release call that worker makes. The token is written as the
/// lock node's payload on acquisition and compared on release to authorize
/// deletion of temporary locks, so sharing a context between workers would
/// let one worker release another's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockContext {
    token: Vec<u8>,
}

impl LockContext {
    /// A fresh context with a random opaque owner token.
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4().to_string().into_bytes(),
        }
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl Default for LockContext {
    fn default() -> Self {
        Self::new()
    }
}
