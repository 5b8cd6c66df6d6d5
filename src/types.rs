use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Server-side session identifier (random, opaque).
///
/// Independent of the browser-local `sess_…` correlator kept by the
/// [`StorageManager`](crate::tracking::StorageManager).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Customer identifier issued by the external data provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct CustomerId(pub String);

/// One-time state value correlating an outbound authorization redirect with a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct StateToken(pub String);

impl SessionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CustomerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl StateToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a [`SessionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingAuthorization,
    Authorized,
}

/// Authoritative server-side session state, stored under `session:{id}`.
///
/// A record only reaches [`SessionStatus::Authorized`] through
/// [`SessionRecord::authorize`], which sets the customer at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub created_at: i64,
    #[serde(default)]
    pub authorized_at: Option<i64>,
    pub expires_at: i64,
}

impl SessionRecord {
    /// New record awaiting external authorization.
    #[must_use]
    pub fn pending(session_id: SessionId, now_ms: i64, ttl_ms: i64) -> Self {
        Self {
            session_id,
            status: SessionStatus::PendingAuthorization,
            customer_id: None,
            created_at: now_ms,
            authorized_at: None,
            expires_at: now_ms + ttl_ms,
        }
    }

    /// Link the session to a customer and restart its lifetime.
    #[must_use]
    pub fn authorize(self, customer_id: CustomerId, now_ms: i64, ttl_ms: i64) -> Self {
        Self {
            status: SessionStatus::Authorized,
            customer_id: Some(customer_id),
            authorized_at: Some(now_ms),
            expires_at: now_ms + ttl_ms,
            ..self
        }
    }

    /// Customer linkage, present only for authorized records.
    #[must_use]
    pub fn linked_customer(&self) -> Option<&CustomerId> {
        match self.status {
            SessionStatus::Authorized => self.customer_id.as_ref(),
            SessionStatus::PendingAuthorization => None,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    #[test]
    fn pending_record_has_no_customer() {
        let record = SessionRecord::pending(SessionId::from("s1".to_string()), 1_000, DAY_MS);
        assert_eq!(record.status, SessionStatus::PendingAuthorization);
        assert!(record.linked_customer().is_none());
        assert_eq!(record.expires_at, 1_000 + DAY_MS);
    }

    #[test]
    fn authorize_sets_status_and_customer_together() {
        let record = SessionRecord::pending(SessionId::from("s1".to_string()), 1_000, DAY_MS)
            .authorize(CustomerId::from("c1".to_string()), 5_000, DAY_MS);
        assert_eq!(record.status, SessionStatus::Authorized);
        assert_eq!(record.linked_customer().map(CustomerId::as_str), Some("c1"));
        assert_eq!(record.created_at, 1_000);
        assert_eq!(record.authorized_at, Some(5_000));
        assert_eq!(record.expires_at, 5_000 + DAY_MS);
    }

    #[test]
    fn authorized_without_customer_is_not_linked() {
        let json = r#"{"sessionId":"s1","status":"authorized","customerId":null,"createdAt":1,"expiresAt":2}"#;
        let record: SessionRecord = serde_json::from_str(json).unwrap();
        assert!(record.linked_customer().is_none());
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = SessionRecord::pending(SessionId::from("abc".to_string()), 10, 20);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["status"], "pending_authorization");
        assert_eq!(json["expiresAt"], 30);
    }

    #[test]
    fn expiry_boundary() {
        let record = SessionRecord::pending(SessionId::from("s".to_string()), 0, 100);
        assert!(!record.is_expired(99));
        assert!(record.is_expired(100));
    }

    #[test]
    fn newtypes_display_inner_value() {
        assert_eq!(CustomerId::from("cust-1".to_string()).to_string(), "cust-1");
        assert_eq!(StateToken::from("st".to_string()).as_str(), "st");
    }
}
