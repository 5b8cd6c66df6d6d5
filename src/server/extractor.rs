use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use super::cookies;
use super::error::AuthError;
use super::state::AppState;
use super::traits::AuthorizationProvider;
use crate::kv::KvStore;
use crate::token::{self, SessionClaims};
use crate::types::{SessionRecord, now_millis};

/// Client address from proxy headers, if any.
///
/// `X-Forwarded-For` (first hop) wins over `X-Real-IP`. Never rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(extract_client_ip(&parts.headers)))
    }
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Verify the session cookie without consulting the store.
///
/// `Ok(None)` when the cookie is missing, badly signed or expired. A bad
/// signing secret is an error, never a silent logout.
pub(super) fn verified_claims<K, P>(
    state: &AppState<K, P>,
    jar: &CookieJar,
) -> Result<Option<SessionClaims>, AuthError> {
    let Some(raw) = cookies::get_session_token(jar, &state.settings.session_cookie_name) else {
        return Ok(None);
    };

    let key = state.settings.signing_key()?;

    match token::verify(&raw, &key, now_millis()) {
        Ok(claims) => Ok(Some(claims)),
        Err(e) => {
            tracing::debug!(error = %e, "Session token rejected");
            Ok(None)
        }
    }
}

/// Resolve the session cookie to a live record.
///
/// `Ok(None)` covers every "not authenticated" case, including a record
/// that is missing or past its `expiresAt`. Only a bad signing secret or a
/// store failure is an error.
pub(super) async fn resolve_session<K: KvStore, P: AuthorizationProvider>(
    state: &AppState<K, P>,
    jar: &CookieJar,
) -> Result<Option<SessionRecord>, AuthError> {
    let Some(claims) = verified_claims(state, jar)? else {
        return Ok(None);
    };

    let record = state
        .sessions()
        .find(&claims.session_id)
        .await?
        .filter(|r| !r.is_expired(now_millis()));
    Ok(record)
}
