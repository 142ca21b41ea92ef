//! Namespace path layout.
//!
//! Lock ids map onto one of three root subtrees depending on the lock
//! level. The server scope qualifier is this machine's address, resolved
//! once at startup; the application qualifier is the configured app name.

use if_addrs::IfAddr;
use tracing::warn;
use zklock_api::LockLevel;

pub const CONFIG_ROOT: &str = "/config";
pub const SERVER_ROOT: &str = "/server";
pub const APP_ROOT: &str = "/application";
pub const GLOBAL_LOCK_ROOT: &str = "/distributed_lock";

/// Name of the runtime debug-flag node under [`CONFIG_ROOT`].
pub const DEBUG_NODE: &str = "debug";

/// Maps (level, id) to namespace paths for one process identity. Pure; all
/// I/O happens once in [`PathResolver::new`] to resolve the local address.
#[derive(Debug, Clone)]
pub struct PathResolver {
    app_name: String,
    server_ip: String,
}

impl PathResolver {
    pub fn new(app_name: &str) -> Self {
        Self::with_server_ip(app_name, &local_ip())
    }

    pub(crate) fn with_server_ip(app_name: &str, server_ip: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            server_ip: server_ip.to_string(),
        }
    }

    pub fn resolve(&self, level: LockLevel, id: &str) -> String {
        match level {
            LockLevel::Application => self.app_lock_path(id),
            LockLevel::Server => self.server_lock_path(id),
            LockLevel::Global => self.global_lock_path(id),
        }
    }

    pub fn app_lock_root(&self) -> String {
        format!("{}/{}", APP_ROOT, self.app_name)
    }

    pub fn app_lock_path(&self, id: &str) -> String {
        format!("{}/{}", self.app_lock_root(), id)
    }

    pub fn server_lock_root(&self) -> String {
        format!("{}/{}", SERVER_ROOT, self.server_ip)
    }

    pub fn server_lock_path(&self, id: &str) -> String {
        format!("{}/{}", self.server_lock_root(), id)
    }

    pub fn global_lock_path(&self, id: &str) -> String {
        format!("{}/{}", GLOBAL_LOCK_ROOT, id)
    }

    pub fn config_path(&self, id: &str) -> String {
        format!("{}/{}", CONFIG_ROOT, id)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn server_ip(&self) -> &str {
        &self.server_ip
    }
}

/// The local IP address used as the server scope qualifier.
///
/// Returns the first non-loopback IPv4 address, falling back to
/// `127.0.0.1` when interface enumeration fails.
pub fn local_ip() -> String {
    let resolved = if_addrs::get_if_addrs().ok().and_then(|addrs| {
        addrs
            .into_iter()
            .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
            .and_then(|iface| match iface.addr {
                IfAddr::V4(addr) => Some(addr.ip.to_string()),
                _ => None,
            })
    });
    resolved.unwrap_or_else(|| {
        warn!("unable to resolve a local address; using 127.0.0.1");
        "127.0.0.1".to_string()
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::with_server_ip("billing", "10.0.0.7")
    }

    #[test]
    fn test_global_path() {
        assert_eq!(
            resolver().resolve(LockLevel::Global, "job-1"),
            "/distributed_lock/job-1"
        );
    }

    #[test]
    fn test_app_path() {
        assert_eq!(
            resolver().resolve(LockLevel::Application, "job-1"),
            "/application/billing/job-1"
        );
    }

    #[test]
    fn test_server_path() {
        assert_eq!(
            resolver().resolve(LockLevel::Server, "job-1"),
            "/server/10.0.0.7/job-1"
        );
    }

    #[test]
    fn test_config_path() {
        assert_eq!(resolver().config_path(DEBUG_NODE), "/config/debug");
    }

    #[test]
    fn test_local_ip_is_ipv4_or_fallback() {
        let ip = local_ip();
        assert_eq!(
            ip.split('.').filter_map(|s| s.parse::<u8>().ok()).count(),
            4
        );
    }

    proptest! {
        #[test]
        fn prop_lock_paths_stay_under_their_root(id in "[a-zA-Z0-9_.-]{1,32}") {
            let r = resolver();
            prop_assert!(r.resolve(LockLevel::Global, &id).starts_with("/distributed_lock/"));
            prop_assert!(r.resolve(LockLevel::Application, &id).starts_with(&r.app_lock_root()));
            prop_assert!(r.resolve(LockLevel::Server, &id).starts_with(&r.server_lock_root()));
        }
    }
}
