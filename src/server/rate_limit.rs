use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use super::error::AuthError;
use crate::kv::KvStore;

/// Fixed-window request limit, counted in the key-value store.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    /// Maximum requests per client per window.
    pub max: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max: 20,
        }
    }
}

/// Counter key. The client address is hashed so no IP is stored.
fn counter_key(scope: &str, client: &str) -> String {
    let digest = Sha256::digest(client.as_bytes());
    format!("ratelimit:{scope}:{}", URL_SAFE_NO_PAD.encode(&digest[..16]))
}

/// Count one request for `client` and reject it if the window is full.
///
/// Store failures let the request through.
pub(super) async fn check<K: KvStore>(
    kv: &K,
    config: &RateLimitConfig,
    scope: &str,
    client: &str,
) -> Result<(), AuthError> {
    if !config.enabled {
        return Ok(());
    }

    match kv.incr(&counter_key(scope, client), config.window_secs).await {
        Ok(count) if count.max(0) as u64 > config.max => {
            tracing::warn!(scope, count, "Rate limit exceeded");
            Err(AuthError::TooManyRequests {
                retry_after: config.window_secs,
            })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, "Rate limit check failed; allowing request");
            Ok(())
        }
    }
}
