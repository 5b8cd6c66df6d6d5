use std::fmt;

use derive_more::Display;

use super::record::{ClickData, ClickRecord};
use super::storage::StorageArea;
use crate::ids;
use crate::types::now_millis;

pub const CLICK_ID_KEY: &str = "dinelportal_click_id";
pub const FINGERPRINT_KEY: &str = "dinelportal_fp";
pub const SESSION_KEY: &str = "dinelportal_session";
pub const DATA_KEY: &str = "dinelportal_data";

const ALL_KEYS: [&str; 4] = [CLICK_ID_KEY, FINGERPRINT_KEY, SESSION_KEY, DATA_KEY];

#[derive(Debug, Clone, Copy, Display)]
enum Mechanism {
    #[display("localStorage")]
    Local,
    #[display("sessionStorage")]
    Session,
    #[display("cookie")]
    Cookie,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingConfig {
    /// Log per-mechanism failures.
    pub debug: bool,
}

/// Redundant attribution storage over local storage, session storage and a cookie.
///
/// A single mechanism failing never surfaces to the caller; it only means
/// one fewer copy. Reads go session → local → cookie.
pub struct StorageManager<L, S, C> {
    local: L,
    session: S,
    cookie: C,
    config: TrackingConfig,
}

impl<L: StorageArea, S: StorageArea, C: StorageArea> StorageManager<L, S, C> {
    #[must_use]
    pub fn new(local: L, session: S, cookie: C, config: TrackingConfig) -> Self {
        Self {
            local,
            session,
            cookie,
            config,
        }
    }

    fn read_order(&self) -> [(Mechanism, &dyn StorageArea); 3] {
        [
            (Mechanism::Session, &self.session),
            (Mechanism::Local, &self.local),
            (Mechanism::Cookie, &self.cookie),
        ]
    }

    fn write_order(&self) -> [(Mechanism, &dyn StorageArea); 3] {
        [
            (Mechanism::Local, &self.local),
            (Mechanism::Session, &self.session),
            (Mechanism::Cookie, &self.cookie),
        ]
    }

    fn report(&self, mechanism: Mechanism, operation: &str, error: &dyn fmt::Display) {
        if self.config.debug {
            tracing::warn!(%mechanism, operation, error = %error, "tracking storage failure");
        }
    }

    /// Persist a click record everywhere possible.
    ///
    /// Returns `true` if at least one mechanism stored the full record.
    pub fn store_data(&self, data: ClickData) -> bool {
        let record = ClickRecord {
            session_id: data
                .session_id
                .unwrap_or_else(|| self.get_or_create_session_id()),
            timestamp: data.timestamp.unwrap_or_else(now_millis),
            click_id: data.click_id,
            fingerprint: data.fingerprint,
            source: data.source,
            page_url: data.page_url,
            referrer: data.referrer,
            user_agent: data.user_agent,
        };

        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                if self.config.debug {
                    tracing::warn!(error = %e, "failed to serialize click record");
                }
                return false;
            }
        };

        let mut stored = false;
        for (mechanism, area) in self.write_order() {
            match area.set_item(DATA_KEY, &json) {
                Ok(()) => stored = true,
                Err(e) => self.report(mechanism, "write record", &e),
            }
            let flat = [
                (CLICK_ID_KEY, record.click_id.as_deref()),
                (FINGERPRINT_KEY, record.fingerprint.as_deref()),
            ];
            for (key, value) in flat {
                if let Some(value) = value {
                    if let Err(e) = area.set_item(key, value) {
                        self.report(mechanism, key, &e);
                    }
                }
            }
        }

        if self.config.debug {
            tracing::debug!(stored, click_id = ?record.click_id, "click record stored");
        }
        stored
    }

    /// Full record from the first mechanism that has a parseable one.
    fn full_record(&self) -> Option<ClickRecord> {
        for (mechanism, area) in self.read_order() {
            match area.get_item(DATA_KEY) {
                Ok(Some(raw)) => match serde_json::from_str::<ClickRecord>(&raw) {
                    Ok(record) => return Some(record),
                    Err(e) => self.report(mechanism, "parse record", &e),
                },
                Ok(None) => {}
                Err(e) => self.report(mechanism, "read record", &e),
            }
        }
        None
    }

    /// First non-empty flat value for `key`, in read order.
    fn flat_value(&self, key: &str) -> Option<String> {
        for (mechanism, area) in self.read_order() {
            match area.get_item(key) {
                Ok(Some(value)) if !value.is_empty() => return Some(value),
                Ok(_) => {}
                Err(e) => self.report(mechanism, key, &e),
            }
        }
        None
    }

    /// Read the click record, rebuilding a partial one from flat keys if needed.
    ///
    /// Returns `None` only when no mechanism holds a record, click id or fingerprint.
    pub fn get_data(&self) -> Option<ClickRecord> {
        if let Some(record) = self.full_record() {
            return Some(record);
        }

        let click_id = self.flat_value(CLICK_ID_KEY);
        let fingerprint = self.flat_value(FINGERPRINT_KEY);
        if click_id.is_none() && fingerprint.is_none() {
            return None;
        }

        Some(ClickRecord {
            click_id,
            fingerprint,
            session_id: self.flat_value(SESSION_KEY).unwrap_or_default(),
            timestamp: now_millis(),
            ..Default::default()
        })
    }

    pub fn get_click_id(&self) -> Option<String> {
        self.flat_value(CLICK_ID_KEY)
            .or_else(|| self.full_record().and_then(|r| r.click_id))
    }

    pub fn get_fingerprint(&self) -> Option<String> {
        self.flat_value(FINGERPRINT_KEY)
            .or_else(|| self.full_record().and_then(|r| r.fingerprint))
    }

    /// Session-scoped correlator, kept in session storage only.
    pub fn get_or_create_session_id(&self) -> String {
        match self.session.get_item(SESSION_KEY) {
            Ok(Some(id)) if !id.is_empty() => return id,
            Ok(_) => {}
            Err(e) => self.report(Mechanism::Session, "read session id", &e),
        }

        let id = ids::generate_local_session_id(now_millis());
        if let Err(e) = self.session.set_item(SESSION_KEY, &id) {
            self.report(Mechanism::Session, "write session id", &e);
        }
        id
    }

    /// Remove every tracking key from every mechanism.
    pub fn clear(&self) {
        for (mechanism, area) in self.write_order() {
            for key in ALL_KEYS {
                if let Err(e) = area.remove_item(key) {
                    self.report(mechanism, "clear", &e);
                }
            }
        }
    }

    #[must_use]
    pub fn local(&self) -> &L {
        &self.local
    }

    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    #[must_use]
    pub fn cookie(&self) -> &C {
        &self.cookie
    }
}
