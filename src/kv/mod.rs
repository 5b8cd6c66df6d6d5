//! Key-value storage for sessions, state tokens, and rate-limit counters.
//!
//! Every write carries a TTL in seconds. Backends:
//! - [`MemoryKv`]: process-local map, for tests and local development.
//! - [`RestKv`]: Upstash-compatible REST endpoint (feature `server`).

use std::future::Future;
use std::sync::Arc;

mod memory;
#[cfg(feature = "server")]
mod rest;

pub use memory::MemoryKv;
#[cfg(feature = "server")]
pub use rest::RestKv;

/// Errors from key-value operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("Unexpected response: {0}")]
    Response(String),
}

/// Key-value store with per-key expiry.
///
/// Implementations only need the four primitives; `take` and `set_many`
/// fall back to sequential calls and should be overridden where the backend
/// can do better.
pub trait KvStore: Send + Sync + 'static {
    /// Get a value. Returns `None` if missing or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send;

    /// Set a value expiring after `ttl_secs`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Increment a counter, setting `ttl_secs` when the counter is created.
    fn incr(&self, key: &str, ttl_secs: u64) -> impl Future<Output = Result<i64, KvError>> + Send;

    /// Read and remove a value.
    fn take(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send {
        async move {
            let value = self.get(key).await?;
            if value.is_some() {
                self.delete(key).await?;
            }
            Ok(value)
        }
    }

    /// Write several keys with the same TTL, in order.
    fn set_many(
        &self,
        entries: &[(String, String)],
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), KvError>> + Send {
        async move {
            for (key, value) in entries {
                self.set(key, value, ttl_secs).await?;
            }
            Ok(())
        }
    }
}

/// Lets callers keep a handle on a store they hand to the router.
impl<T: KvStore> KvStore for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send {
        (**self).get(key)
    }

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), KvError>> + Send {
        (**self).set(key, value, ttl_secs)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), KvError>> + Send {
        (**self).delete(key)
    }

    fn incr(&self, key: &str, ttl_secs: u64) -> impl Future<Output = Result<i64, KvError>> + Send {
        (**self).incr(key, ttl_secs)
    }

    fn take(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send {
        (**self).take(key)
    }

    fn set_many(
        &self,
        entries: &[(String, String)],
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), KvError>> + Send {
        (**self).set_many(entries, ttl_secs)
    }
}
