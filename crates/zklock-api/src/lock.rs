//! Lock value types.

/// Mode value marking a persistent lock: the lock node survives its
/// creator's session and is deletable by any caller.
pub const PERSISTENT_MODE: i32 = 1;

/// Scope under which a lock id is namespaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockLevel {
    /// Shared by all processes registered under the same application name.
    Application,
    /// Shared by all processes on the same server address.
    Server,
    /// Shared by every process talking to the same coordination service.
    Global,
}

/// An immutable lock request.
///
/// Two locks are equal when all four fields are equal. The payload is
/// caller-supplied descriptive data carried with the request; the node
/// written to the namespace holds the acquiring context's owner token,
/// not this payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lock {
    id: String,
    payload: Vec<u8>,
    level: LockLevel,
    mode: i32,
}

impl Lock {
    /// A temporary lock: released only by the context that acquired it,
    /// and reaped by the coordination service if that session dies.
    pub fn new(id: impl Into<String>, payload: Vec<u8>, level: LockLevel) -> Self {
        Self::with_mode(id, payload, level, 0)
    }

    /// A lock with an explicit mode; see [`PERSISTENT_MODE`].
    pub fn with_mode(id: impl Into<String>, payload: Vec<u8>, level: LockLevel, mode: i32) -> Self {
        Self {
            id: id.into(),
            payload,
            level,
            mode,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn level(&self) -> LockLevel {
        self.level
    }

    pub fn mode(&self) -> i32 {
        self.mode
    }

    pub fn is_persistent(&self) -> bool {
        self.mode == PERSISTENT_MODE
    }
}
