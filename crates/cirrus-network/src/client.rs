//! Shared HTTP client construction.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};

use cirrus_core::error::{Error, Result};

/// `internxt-version` header on Network-tier calls.
pub const NETWORK_VERSION: &str = "1.0";

/// `internxt-version` header on Drive-tier metadata writes.
pub const DRIVE_VERSION: &str = "v1.0.436";

/// Build the one pooled client the whole process shares.
///
/// The client tag rides along as a default header so every request carries
/// it without each call site remembering to.
pub fn build_client(client_tag: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let tag = HeaderValue::from_str(client_tag)
        .map_err(|e| Error::Other(anyhow::anyhow!("invalid client tag {client_tag:?}: {e}")))?;
    headers.insert("internxt-client", tag);

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(20))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .build()?;

    Ok(client)
}

/// Basic header for the Network tier: `Basic base64(user ":" sha256hex(id))`.
pub fn compute_basic_auth(bridge_user: &str, user_id: &str) -> String {
    let hash = hex::encode(Sha256::digest(user_id.as_bytes()));
    let credentials = format!("{bridge_user}:{hash}");
    format!("Basic {}", BASE64.encode(credentials.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_shape() {
        let header = compute_basic_auth("user@example.com", "12345");
        assert!(header.starts_with("Basic "));

        let decoded = BASE64.decode(&header["Basic ".len()..]).unwrap();
        let decoded = String::from_utf8(decoded).unwrap();
        let (user, hash) = decoded.split_once(':').unwrap();
        assert_eq!(user, "user@example.com");
        assert_eq!(hash, hex::encode(Sha256::digest(b"12345")));
    }

    #[test]
    fn build_client_succeeds() {
        assert!(build_client("cirrus-test").is_ok());
    }

    #[test]
    fn build_client_rejects_bad_tag() {
        assert!(build_client("bad\ntag").is_err());
    }
}
