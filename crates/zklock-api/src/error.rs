//! Error taxonomy for lock operations.
//!
//! Only infrastructure failures surface as errors. Contention and
//! interrupted waits resolve to a `false` boolean from acquire/release, so
//! callers can always tell "lock not obtained" apart from "the lock service
//! is broken".

/// A failure propagated from a lock operation after local self-healing
/// (reconnect, root recreation, re-authentication) has itself failed.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Transport or session broken, or never established.
    #[error("coordination connection fault: {0}")]
    Connection(String),

    /// A structural root node is missing and could not be recreated.
    #[error("namespace corruption at {path}")]
    NamespaceCorruption { path: String },

    /// The session lacks rights on a node and re-authentication failed.
    #[error("not authorized for {path}")]
    Unauthorized { path: String },

    /// Invalid endpoint or credential at manager construction.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LockError {
    pub fn connection(msg: impl Into<String>) -> Self {
        LockError::Connection(msg.into())
    }
}

/// Faults that are not coordination-service faults at all (local I/O,
/// channel breakage) are wrapped and surfaced as a connection fault.
impl From<anyhow::Error> for LockError {
    fn from(err: anyhow::Error) -> Self {
        LockError::Connection(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
