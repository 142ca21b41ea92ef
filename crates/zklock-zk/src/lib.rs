//! Coordination-namespace lock backend
//!
//! Implements the zklock API on a hierarchical coordination namespace
//! offering atomic create, ephemeral/persistent node lifetimes, and one-shot
//! change watches. This crate provides:
//! - The minimal client contract the namespace service must satisfy
//! - An in-process namespace implementation for tests and single-process use
//! - The session lifecycle manager (bootstrap, registration, debug flag,
//!   transparent rebuild after session expiry)
//! - Fault classification and self-healing
//! - The lock acquisition and release engines

pub mod auth;
pub mod client;
pub mod config;
pub mod manager;
pub mod memory;
pub mod paths;
pub mod recovery;
pub mod session;

pub use client::{
    Acl, ExistsReply, NodeLifetime, SessionEvent, SessionState, WatchEvent, ZkClient, ZkError,
    ZkResult,
};
pub use config::ZkConfig;
pub use manager::ZkLockManager;
pub use memory::MemoryZk;
pub use paths::PathResolver;
pub use session::SessionManager;
