//! Completion of the external authorization flow.
//!
//! The handler never answers with JSON: success is a small HTML page that
//! mirrors the customer id into `sessionStorage` and forwards the browser,
//! failure is a redirect carrying a categorized `error` query parameter.

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::cookies;
use super::state::AppState;
use super::store::StateLookup;
use super::traits::AuthorizationProvider;
use crate::datahub::select_latest;
use crate::kv::KvStore;
use crate::token::{self, SessionClaims};
use crate::types::{CustomerId, SessionStatus, StateToken, now_millis};

/// `sessionStorage` key the completion page writes the customer id to.
pub const CUSTOMER_STORAGE_KEY: &str = "eloverblik_customer_id";

/// Categorized callback failure, sent to the browser as `?error=<code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackError {
    MissingState,
    InvalidState,
    NoSession,
    NoAuthorizations,
    Failed,
}

impl CallbackError {
    fn code(self) -> &'static str {
        match self {
            Self::MissingState => "missing_state",
            Self::InvalidState => "invalid_state",
            Self::NoSession => "no_session",
            Self::NoAuthorizations => "no_authorizations",
            Self::Failed => "callback_failed",
        }
    }
}

#[derive(Deserialize)]
pub(super) struct CallbackParams {
    state: Option<String>,
}

pub(super) async fn callback<K: KvStore, P: AuthorizationProvider>(
    State(state): State<AppState<K, P>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    match complete(&state, params).await {
        Ok((cookie_token, customer_id)) => {
            let cookie = cookies::session_cookie(
                &state.settings.session_cookie_name,
                &cookie_token,
                state.settings.session_ttl,
                state.settings.secure_cookies,
            );
            let page = completion_page(&customer_id, &state.settings.app_redirect);
            (jar.add(cookie), Html(page)).into_response()
        }
        Err(e) => callback_error(&state.settings.error_redirect, e),
    }
}

async fn complete<K: KvStore, P: AuthorizationProvider>(
    state: &AppState<K, P>,
    params: CallbackParams,
) -> Result<(String, CustomerId), CallbackError> {
    let state_token = params
        .state
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(StateToken::from)
        .ok_or(CallbackError::MissingState)?;

    let sessions = state.sessions();

    let session_id = match sessions.take_state(&state_token).await {
        Ok(StateLookup::Session(id)) => id,
        Ok(StateLookup::Missing | StateLookup::Malformed) => {
            tracing::warn!("Unknown or already used callback state");
            return Err(CallbackError::InvalidState);
        }
        Ok(StateLookup::NoSession) => return Err(CallbackError::NoSession),
        Err(e) => {
            tracing::error!(error = %e, "State lookup failed");
            return Err(CallbackError::Failed);
        }
    };

    let now = now_millis();
    let record = sessions
        .find(&session_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session lookup failed");
            CallbackError::Failed
        })?
        .filter(|r| !r.is_expired(now))
        .ok_or_else(|| {
            tracing::warn!(session_id = %session_id, "Callback for unknown or expired session");
            CallbackError::NoSession
        })?;

    // Only a pending session may be linked; an authorized one keeps its customer.
    if record.status != SessionStatus::PendingAuthorization {
        tracing::warn!(session_id = %session_id, "Callback for an already authorized session");
        return Err(CallbackError::NoSession);
    }

    let key = state.settings.signing_key().map_err(|e| {
        tracing::error!(error = %e, "Signing key unavailable");
        CallbackError::Failed
    })?;

    let access_token = state.provider.access_token().await.map_err(|e| {
        tracing::error!(error = %e, "Access token exchange failed");
        CallbackError::Failed
    })?;

    let grants = state
        .provider
        .authorizations(&access_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Authorization fetch failed");
            CallbackError::Failed
        })?;

    if grants.is_empty() {
        tracing::warn!(session_id = %session_id, "Provider returned no authorizations");
        return Err(CallbackError::NoAuthorizations);
    }

    let customer_id = select_latest(grants)
        .and_then(|g| g.customer_id())
        .ok_or_else(|| {
            tracing::error!("Newest authorization carries no customer id");
            CallbackError::Failed
        })?;

    let ttl_ms = state.settings.ttl_ms();
    let created_at = record.created_at;
    let record = record.authorize(customer_id.clone(), now, ttl_ms);

    sessions.link_customer(&record).await.map_err(|e| {
        tracing::error!(error = %e, "Session linking failed");
        CallbackError::Failed
    })?;

    let claims = SessionClaims::new(
        session_id.clone(),
        Some(customer_id.clone()),
        created_at,
        now,
        ttl_ms,
    );
    let signed = token::sign(&claims, &key).map_err(|e| {
        tracing::error!(error = %e, "Session token signing failed");
        CallbackError::Failed
    })?;

    tracing::info!(session_id = %session_id, "Session linked to customer");
    Ok((signed, customer_id))
}

fn callback_error(error_redirect: &str, error: CallbackError) -> Response {
    let separator = if error_redirect.contains('?') { '&' } else { '?' };
    Redirect::to(&format!(
        "{error_redirect}{separator}error={}",
        urlencoding::encode(error.code())
    ))
    .into_response()
}

fn completion_page(customer_id: &CustomerId, redirect: &str) -> String {
    let js_customer = script_string(customer_id.as_str());
    let js_redirect = script_string(redirect);
    let attr_redirect = escape_attribute(redirect);
    format!(
        r#"<!DOCTYPE html>
<html lang="da">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="2;url={attr_redirect}">
<title>Forbindelse oprettet</title>
</head>
<body>
<p>Forbindelsen til Eloverblik er oprettet. Du sendes videre&hellip;</p>
<script>
try {{ sessionStorage.setItem("{CUSTOMER_STORAGE_KEY}", {js_customer}); }} catch (e) {{}}
window.location.replace({js_redirect});
</script>
</body>
</html>
"#
    )
}

/// JSON string literal safe inside a `<script>` element.
fn script_string(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
