use serde::{Deserialize, Serialize};

use crate::types::now_millis;

/// Attribution record mirrored across the three client storage mechanisms.
///
/// Contains nothing secret and no personal data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub session_id: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClickRecord {
    /// `true` if the record is older than `max_age_ms`. Equality is not expired.
    #[must_use]
    pub fn is_expired(&self, max_age_ms: i64) -> bool {
        self.is_expired_at(max_age_ms, now_millis())
    }

    #[must_use]
    pub fn is_expired_at(&self, max_age_ms: i64, now_ms: i64) -> bool {
        now_ms - self.timestamp > max_age_ms
    }
}

/// Caller-supplied fields for [`StorageManager::store_data`](super::StorageManager::store_data).
///
/// `session_id` and `timestamp` are filled in when absent.
#[derive(Debug, Clone, Default)]
pub struct ClickData {
    pub click_id: Option<String>,
    pub fingerprint: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<i64>,
    pub source: Option<String>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}
