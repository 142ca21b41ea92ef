//! Digest credential helpers.
//!
//! The admin credential is a `id:secret` pair. The session registers the
//! raw pair; access rules carry only the one-way digest
//! `id:base64(sha256(id:secret))`, so node ACLs never store the secret.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use zklock_api::{LockError, Result};

/// Authentication scheme understood by the coordination service.
pub const DIGEST_SCHEME: &str = "digest";

/// One-way digest of an `id:secret` credential.
pub fn generate_digest(credential: &str) -> Result<String> {
    let id = credential_id(credential)?;
    let hash = Sha256::digest(credential.as_bytes());
    Ok(format!("{}:{}", id, BASE64.encode(hash)))
}

/// The id part of an `id:secret` credential.
pub fn credential_id(credential: &str) -> Result<&str> {
    match credential.split_once(':') {
        Some((id, secret)) if !id.is_empty() && !secret.is_empty() => Ok(id),
        _ => Err(LockError::Config(
            "credential must be in 'id:secret' format".to_string(),
        )),
    }
}
