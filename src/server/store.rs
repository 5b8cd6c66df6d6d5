use serde::{Deserialize, Serialize};

use crate::kv::{KvError, KvStore};
use crate::types::{CustomerId, SessionId, SessionRecord, StateToken};

/// Key layout in the key-value store.
pub(crate) mod keys {
    pub(crate) fn session(id: &str) -> String {
        format!("session:{id}")
    }

    pub(crate) fn session_customer(id: &str) -> String {
        format!("session:{id}:customer")
    }

    pub(crate) fn customer_session(customer_id: &str) -> String {
        format!("customer:{customer_id}:session")
    }

    pub(crate) fn state(token: &str) -> String {
        format!("state:{token}")
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload {
    #[serde(default)]
    session_id: String,
}

/// Result of consuming a state token.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum StateLookup {
    /// Unknown, expired or already used.
    Missing,
    /// Present but not a `{sessionId}` document.
    Malformed,
    /// Present and well-formed but without a session id.
    NoSession,
    Session(SessionId),
}

/// Session persistence over a [`KvStore`].
///
/// The `session:{id}` record is the source of truth. The forward
/// (`session:{id}:customer`) and reverse (`customer:{id}:session`) mappings
/// are derived from it and rewritten by [`SessionRepository::reconcile`] when
/// they drift.
pub(super) struct SessionRepository<'a, K> {
    kv: &'a K,
    ttl_secs: u64,
}

impl<'a, K: KvStore> SessionRepository<'a, K> {
    pub(super) fn new(kv: &'a K, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    pub(super) async fn create(&self, record: &SessionRecord) -> Result<(), KvError> {
        let json = encode(record)?;
        self.kv
            .set(&keys::session(record.session_id.as_str()), &json, self.ttl_secs)
            .await
    }

    /// Load a record. Unparseable records are treated as missing.
    pub(super) async fn find(&self, id: &SessionId) -> Result<Option<SessionRecord>, KvError> {
        let Some(raw) = self.kv.get(&keys::session(id.as_str())).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(error = %e, session_id = %id, "Unreadable session record");
                Ok(None)
            }
        }
    }

    /// Persist an authorized record and both customer mappings.
    ///
    /// The record is written first so that a partial failure leaves the
    /// source of truth updated and only derived keys missing.
    pub(super) async fn link_customer(&self, record: &SessionRecord) -> Result<(), KvError> {
        let Some(customer_id) = record.linked_customer() else {
            return Err(KvError::Command(
                "refusing to link a session without a customer".into(),
            ));
        };
        let session_id = record.session_id.as_str();
        let entries = vec![
            (keys::session(session_id), encode(record)?),
            (
                keys::session_customer(session_id),
                customer_id.as_str().to_string(),
            ),
            (
                keys::customer_session(customer_id.as_str()),
                session_id.to_string(),
            ),
        ];
        self.kv.set_many(&entries, self.ttl_secs).await
    }

    /// Rewrite the customer mappings of an authorized record if they drifted.
    ///
    /// Failures are logged and ignored; the next verify tries again.
    pub(super) async fn reconcile(&self, record: &SessionRecord) {
        let Some(customer_id) = record.linked_customer() else {
            return;
        };
        let session_id = record.session_id.as_str();
        let forward_key = keys::session_customer(session_id);
        let reverse_key = keys::customer_session(customer_id.as_str());

        let (forward, reverse) = match (
            self.kv.get(&forward_key).await,
            self.kv.get(&reverse_key).await,
        ) {
            (Ok(forward), Ok(reverse)) => (forward, reverse),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Could not read session mappings");
                return;
            }
        };

        let mut entries = Vec::new();
        if forward.as_deref() != Some(customer_id.as_str()) {
            entries.push((forward_key, customer_id.as_str().to_string()));
        }
        match reverse.as_deref() {
            Some(owner) if owner == session_id => {}
            Some(owner) => match self.owns_customer(owner, customer_id).await {
                Ok(true) => {}
                Ok(false) => entries.push((reverse_key, session_id.to_string())),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not check reverse mapping owner");
                }
            },
            None => entries.push((reverse_key, session_id.to_string())),
        }

        if entries.is_empty() {
            return;
        }

        tracing::warn!(session_id, repaired = entries.len(), "Repairing stale session mappings");
        let remaining_ms = record.expires_at - crate::types::now_millis();
        let ttl = u64::try_from(remaining_ms / 1000).unwrap_or(0).max(1);
        if let Err(e) = self.kv.set_many(&entries, ttl).await {
            tracing::warn!(error = %e, "Session mapping repair failed");
        }
    }

    /// Whether `owner` is a live session linked to `customer_id`.
    ///
    /// A reverse mapping held by such a session is current and must not be
    /// taken over by another session of the same customer.
    async fn owns_customer(&self, owner: &str, customer_id: &CustomerId) -> Result<bool, KvError> {
        let now = crate::types::now_millis();
        Ok(self
            .find(&SessionId::from(owner.to_string()))
            .await?
            .filter(|r| !r.is_expired(now))
            .is_some_and(|r| r.linked_customer() == Some(customer_id)))
    }

    /// Customer linked to a session, from the record or the forward mapping.
    pub(super) async fn linked_customer_of(
        &self,
        id: &SessionId,
    ) -> Result<Option<CustomerId>, KvError> {
        if let Some(customer) = self
            .find(id)
            .await?
            .and_then(|r| r.linked_customer().cloned())
        {
            return Ok(Some(customer));
        }
        Ok(self
            .kv
            .get(&keys::session_customer(id.as_str()))
            .await?
            .filter(|c| !c.is_empty())
            .map(CustomerId::from))
    }

    /// Delete a session and its mappings.
    ///
    /// The reverse mapping is only removed while it still points at this
    /// session; the customer may have linked a newer one since.
    pub(super) async fn delete(
        &self,
        id: &SessionId,
        customer_id: Option<&CustomerId>,
    ) -> Result<(), KvError> {
        self.kv.delete(&keys::session(id.as_str())).await?;
        self.kv.delete(&keys::session_customer(id.as_str())).await?;

        if let Some(customer_id) = customer_id {
            let reverse_key = keys::customer_session(customer_id.as_str());
            if self.kv.get(&reverse_key).await?.as_deref() == Some(id.as_str()) {
                self.kv.delete(&reverse_key).await?;
            }
        }
        Ok(())
    }

    pub(super) async fn put_state(
        &self,
        state: &StateToken,
        session_id: &SessionId,
    ) -> Result<(), KvError> {
        let payload = StatePayload {
            session_id: session_id.as_str().to_string(),
        };
        let json = encode(&payload)?;
        self.kv
            .set(&keys::state(state.as_str()), &json, self.ttl_secs)
            .await
    }

    /// Consume a state token. It is deleted whether or not it parses.
    pub(super) async fn take_state(&self, state: &StateToken) -> Result<StateLookup, KvError> {
        let Some(raw) = self.kv.take(&keys::state(state.as_str())).await? else {
            return Ok(StateLookup::Missing);
        };
        let Ok(payload) = serde_json::from_str::<StatePayload>(&raw) else {
            return Ok(StateLookup::Malformed);
        };
        let session_id = payload.session_id.trim();
        if session_id.is_empty() {
            return Ok(StateLookup::NoSession);
        }
        Ok(StateLookup::Session(SessionId::from(session_id.to_string())))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, KvError> {
    serde_json::to_string(value).map_err(|e| KvError::Command(format!("encode: {e}")))
}
