//! Client-side click attribution.
//!
//! A [`ClickRecord`] is written redundantly to local storage, session storage
//! and a first-party cookie, so losing any one of them (private browsing,
//! blocked cookies, quota) does not lose the attribution.
//!
//! ```rust,ignore
//! use elportal_auth::tracking::{
//!     ClickData, CookieOptions, CookieStorage, MemoryStorage, StorageManager, TrackingConfig,
//! };
//!
//! let manager = StorageManager::new(
//!     MemoryStorage::new(),
//!     MemoryStorage::new(),
//!     CookieStorage::from_header(cookie_header, CookieOptions::default()),
//!     TrackingConfig { debug: false },
//! );
//! manager.store_data(ClickData { click_id: Some(click_id), ..Default::default() });
//! ```

mod manager;
mod record;
mod storage;

pub use manager::{
    CLICK_ID_KEY, DATA_KEY, FINGERPRINT_KEY, SESSION_KEY, StorageManager, TrackingConfig,
};
pub use record::{ClickData, ClickRecord};
pub use storage::{CookieOptions, CookieStorage, MemoryStorage, StorageArea, StorageError};

/// Re-export for [`CookieOptions::same_site`].
pub use cookie::SameSite;
