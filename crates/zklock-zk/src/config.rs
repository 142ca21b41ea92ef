//! Manager configuration.

use std::sync::LazyLock;

use tracing::warn;
use zklock_api::{LockError, Result};

use crate::auth;

/// Environment override for the contention polling interval.
pub const ENV_POLL_INTERVAL: &str = "ZKLOCK_POLL_INTERVAL_MS";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

static HOSTNAME_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])(\.([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9]))*$",
    )
    .expect("invalid hostname pattern")
});

/// Configuration for a session manager.
///
/// Invalid values are rejected at manager construction; a configuration
/// fault is always fatal at startup.
#[derive(Debug, Clone)]
pub struct ZkConfig {
    /// Coordination-service endpoint, `host:port`.
    pub endpoint: String,
    /// Session timeout negotiated with the service.
    pub session_timeout_ms: u64,
    /// Application name used as the application scope qualifier.
    pub app_name: String,
    /// Admin credential, `id:secret`.
    pub admin_credential: String,
    /// Bootstrap attempts when recovering a broken session.
    pub reconnect_attempts: u32,
    /// Wait interval of the contention polling loop.
    pub poll_interval_ms: u64,
}

impl Default for ZkConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:2181".to_string(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            app_name: "zklock".to_string(),
            admin_credential: "admin:admin".to_string(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ZkConfig {
    /// Defaults with the given endpoint, honoring the
    /// [`ENV_POLL_INTERVAL`] environment override.
    pub fn new(endpoint: &str) -> Self {
        let mut config = Self {
            endpoint: endpoint.to_string(),
            ..Self::default()
        };
        if let Ok(raw) = std::env::var(ENV_POLL_INTERVAL) {
            match parse_interval(&raw) {
                Some(ms) => config.poll_interval_ms = ms,
                None => warn!(value = %raw, "ignoring invalid {ENV_POLL_INTERVAL}"),
            }
        }
        config
    }

    pub fn with_app_name(mut self, app_name: &str) -> Self {
        self.app_name = app_name.to_string();
        self
    }

    pub fn with_credential(mut self, credential: &str) -> Self {
        self.admin_credential = credential.to_string();
        self
    }

    pub fn with_session_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.session_timeout_ms = timeout_ms;
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (host, port) = self
            .endpoint
            .split_once(':')
            .ok_or_else(|| LockError::Config("endpoint must be in 'host:port' format".into()))?;
        if port.contains(':') {
            return Err(LockError::Config(
                "endpoint must be in 'host:port' format".into(),
            ));
        }
        match port.parse::<u32>() {
            Ok(p) if (1..=65535).contains(&p) => {}
            _ => {
                return Err(LockError::Config(format!(
                    "invalid endpoint port: {port}"
                )));
            }
        }
        if !is_valid_hostname(host.trim()) {
            return Err(LockError::Config(format!("invalid endpoint host: {host}")));
        }
        if self.app_name.trim().is_empty() {
            return Err(LockError::Config("application name is empty".into()));
        }
        auth::credential_id(&self.admin_credential)?;
        if self.session_timeout_ms == 0 {
            return Err(LockError::Config("session timeout must be nonzero".into()));
        }
        if self.reconnect_attempts == 0 {
            return Err(LockError::Config(
                "reconnect attempt count must be nonzero".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(LockError::Config("poll interval must be nonzero".into()));
        }
        Ok(())
    }
}

fn parse_interval(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|ms| *ms > 0)
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 255 {
        return false;
    }
    if host.split('.').all(|part| part.parse::<u64>().is_ok()) {
        return is_valid_ipv4(host);
    }
    HOSTNAME_PATTERN.is_match(host)
}

fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    parts.len() == 4 && parts.iter().all(|part| part.parse::<u8>().is_ok())
}
