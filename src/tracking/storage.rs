use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Browser cookies are limited to roughly 4 KiB each.
const MAX_COOKIE_BYTES: usize = 4096;

/// Failure of a single storage mechanism.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Mechanism disabled (private browsing, blocked cookies).
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage quota exceeded")]
    QuotaExceeded,
}

/// A string key-value storage area (`localStorage`, `sessionStorage`, cookies).
pub trait StorageArea: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage area with the failure modes of Web Storage.
#[derive(Debug)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    available: AtomicBool,
    quota_bytes: Option<usize>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            quota_bytes: None,
        }
    }

    /// A storage area on which every operation fails.
    #[must_use]
    pub fn unavailable() -> Self {
        let storage = Self::new();
        storage.set_available(false);
        storage
    }

    /// Limit total stored bytes (keys plus values).
    #[must_use]
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn items(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(self.items.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl StorageArea for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items()?.remove(key);
        Ok(())
    }
}

/// Attributes applied to every tracking cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub expiry_days: i64,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            expiry_days: 30,
            domain: None,
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

/// First-party cookie storage backed by a cookie jar.
///
/// Values are URL-encoded. Seed it from the request `Cookie` header with
/// [`CookieStorage::from_header`] and emit changes with
/// [`CookieStorage::set_cookie_headers`].
#[derive(Debug)]
pub struct CookieStorage {
    jar: Mutex<CookieJar>,
    options: CookieOptions,
    enabled: AtomicBool,
}

impl CookieStorage {
    #[must_use]
    pub fn new(options: CookieOptions) -> Self {
        Self {
            jar: Mutex::new(CookieJar::new()),
            options,
            enabled: AtomicBool::new(true),
        }
    }

    /// Parse a `Cookie` request header. Malformed pairs are skipped.
    #[must_use]
    pub fn from_header(header: &str, options: CookieOptions) -> Self {
        let mut jar = CookieJar::new();
        for cookie in Cookie::split_parse(header).flatten() {
            jar.add_original(cookie.into_owned());
        }
        Self {
            jar: Mutex::new(jar),
            options,
            enabled: AtomicBool::new(true),
        }
    }

    /// Simulate cookies being blocked by the browser.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// `Set-Cookie` header values for every change made through this storage.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.jar
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .delta()
            .map(ToString::to_string)
            .collect()
    }

    fn jar(&self) -> Result<MutexGuard<'_, CookieJar>, StorageError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(self.jar.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn build(&self, key: &str, value: String, max_age: Duration) -> Cookie<'static> {
        let mut builder = Cookie::build((key.to_string(), value))
            .path("/")
            .max_age(max_age)
            .secure(self.options.secure)
            .same_site(self.options.same_site);
        if let Some(domain) = &self.options.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

impl StorageArea for CookieStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let jar = self.jar()?;
        Ok(jar.get(key).and_then(|c| {
            urlencoding::decode(c.value())
                .ok()
                .map(|v| v.into_owned())
        }))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let encoded = urlencoding::encode(value).into_owned();
        if key.len() + encoded.len() > MAX_COOKIE_BYTES {
            return Err(StorageError::QuotaExceeded);
        }
        let cookie = self.build(key, encoded, Duration::days(self.options.expiry_days));
        self.jar()?.add(cookie);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let cookie = self.build(key, String::new(), Duration::ZERO);
        self.jar()?.remove(cookie);
        Ok(())
    }
}
