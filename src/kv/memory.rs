use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{KvError, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`KvStore`].
///
/// Not shared across processes. `take` and `set_many` run under a single
/// lock, so they are atomic within this process.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live_value(map: &HashMap<String, Entry>, key: &str, now: Instant) -> Option<String> {
        map.get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    /// Expired entries are dropped on every write, so the map stays bounded
    /// by what is live.
    fn evict_expired(map: &mut HashMap<String, Entry>, now: Instant) {
        map.retain(|_, e| e.is_live(now));
    }

    fn insert(map: &mut HashMap<String, Entry>, key: &str, value: &str, ttl_secs: u64) {
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
    }
}

impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(Self::live_value(&self.lock(), key, Instant::now()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let mut map = self.lock();
        Self::evict_expired(&mut map, Instant::now());
        Self::insert(&mut map, key, value, ttl_secs);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64, KvError> {
        let now = Instant::now();
        let mut map = self.lock();
        Self::evict_expired(&mut map, now);
        let (current, expires_at) = match map.get(key) {
            Some(entry) if entry.is_live(now) => {
                let n = entry
                    .value
                    .parse::<i64>()
                    .map_err(|_| KvError::Command(format!("value at {key} is not an integer")))?;
                (n, entry.expires_at)
            }
            _ => (0, now + Duration::from_secs(ttl_secs)),
        };
        let next = current + 1;
        map.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let mut map = self.lock();
        Ok(map.remove(key).filter(|e| e.is_live(now)).map(|e| e.value))
    }

    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> Result<(), KvError> {
        let mut map = self.lock();
        Self::evict_expired(&mut map, Instant::now());
        for (key, value) in entries {
            Self::insert(&mut map, key, value, ttl_secs);
        }
        Ok(())
    }
}
