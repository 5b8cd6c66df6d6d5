use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use super::callback::callback;
use super::config::AuthConfig;
use super::cookies;
use super::error::AuthError;
use super::extractor::{ClientIp, resolve_session, verified_claims};
use super::rate_limit;
use super::state::AppState;
use super::traits::AuthorizationProvider;
use crate::ids::{generate_session_id, generate_state};
use crate::kv::KvStore;
use crate::token::{self, SessionClaims};
use crate::types::{CustomerId, SessionId, SessionRecord, StateToken, now_millis};

/// Create the session and callback router.
///
/// Mounts `{auth_path}/session` (dispatching on `?action=`) and
/// `{auth_path}/callback`.
pub fn auth_routes<K, P>(config: AuthConfig, kv: K, provider: P) -> Router
where
    K: KvStore,
    P: AuthorizationProvider,
{
    let auth_path = config.settings.auth_path.clone();

    let state = AppState {
        kv: Arc::new(kv),
        provider: Arc::new(provider),
        settings: config.settings,
    };

    Router::new()
        .route(
            &format!("{auth_path}/session"),
            get(session::<K, P>)
                .post(session::<K, P>)
                .delete(session::<K, P>),
        )
        .route(&format!("{auth_path}/callback"), get(callback::<K, P>))
        .with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Init,
    Verify,
    Logout,
    Authorize,
}

impl Action {
    fn parse(action: Option<&str>) -> Result<Self, AuthError> {
        match action {
            Some("init") => Ok(Self::Init),
            Some("verify") => Ok(Self::Verify),
            Some("logout") => Ok(Self::Logout),
            Some("authorize") => Ok(Self::Authorize),
            other => Err(AuthError::InvalidAction(other.unwrap_or_default().to_string())),
        }
    }

    fn allows(self, method: &Method) -> bool {
        match self {
            Self::Init | Self::Authorize => method == Method::POST,
            Self::Verify => method == Method::GET,
            Self::Logout => method == Method::DELETE || method == Method::POST,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Verify => "verify",
            Self::Logout => "logout",
            Self::Authorize => "authorize",
        }
    }
}

#[derive(Deserialize)]
struct SessionParams {
    action: Option<String>,
}

async fn session<K: KvStore, P: AuthorizationProvider>(
    State(state): State<AppState<K, P>>,
    method: Method,
    client_ip: ClientIp,
    jar: CookieJar,
    Query(params): Query<SessionParams>,
) -> Result<Response, AuthError> {
    let action = Action::parse(params.action.as_deref())?;
    if !action.allows(&method) {
        return Err(AuthError::MethodNotAllowed(action.name().to_string()));
    }

    match action {
        Action::Init => init(&state, jar, client_ip).await,
        Action::Verify => verify(&state, &jar).await,
        Action::Logout => logout(&state, jar).await,
        Action::Authorize => authorize(&state, &jar).await,
    }
}

// ── Init ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    session_id: SessionId,
    expires_in: u64,
    status: &'static str,
}

async fn init<K: KvStore, P: AuthorizationProvider>(
    state: &AppState<K, P>,
    jar: CookieJar,
    ClientIp(client_ip): ClientIp,
) -> Result<Response, AuthError> {
    let client = client_ip.as_deref().unwrap_or("unknown");
    rate_limit::check(&*state.kv, &state.settings.rate_limit, "init", client).await?;

    let key = state.settings.signing_key()?;

    let now = now_millis();
    let ttl_ms = state.settings.ttl_ms();
    let session_id = SessionId::from(generate_session_id());
    let record = SessionRecord::pending(session_id.clone(), now, ttl_ms);
    state.sessions().create(&record).await?;

    let claims = SessionClaims::new(session_id.clone(), None, now, now, ttl_ms);
    let signed = token::sign(&claims, &key)?;

    let cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &signed,
        state.settings.session_ttl,
        state.settings.secure_cookies,
    );

    tracing::info!(session_id = %session_id, "Session created");

    let body = InitResponse {
        session_id,
        expires_in: state.settings.ttl_secs(),
        status: "created",
    };
    Ok((jar.add(cookie), Json(body)).into_response())
}

// ── Verify ─────────────────────────────────────────────────────────

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_authorization: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_id: Option<CustomerId>,
}

async fn verify<K: KvStore, P: AuthorizationProvider>(
    state: &AppState<K, P>,
    jar: &CookieJar,
) -> Result<Response, AuthError> {
    let Some(record) = resolve_session(state, jar).await? else {
        return Ok(Json(VerifyResponse::default()).into_response());
    };

    let customer_id = record.linked_customer().cloned();
    if customer_id.is_some() {
        state.sessions().reconcile(&record).await;
    }

    Ok(Json(VerifyResponse {
        authenticated: true,
        session_id: Some(record.session_id),
        has_authorization: Some(customer_id.is_some()),
        customer_id,
    })
    .into_response())
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<K: KvStore, P: AuthorizationProvider>(
    state: &AppState<K, P>,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    if let Some(claims) = verified_claims(state, &jar)? {
        let sessions = state.sessions();
        // Linkage must be read before the record is gone.
        let customer_id = match sessions.linked_customer_of(&claims.session_id).await {
            Ok(found) => found.or(claims.customer_id),
            Err(e) => {
                tracing::warn!(error = %e, "Customer lookup failed during logout");
                claims.customer_id
            }
        };
        if let Err(e) = sessions.delete(&claims.session_id, customer_id.as_ref()).await {
            tracing::warn!(error = %e, "Session deletion failed during logout");
        } else {
            tracing::info!(session_id = %claims.session_id, "Session logged out");
        }
    }

    let clear = cookies::clear_session_cookie(
        &state.settings.session_cookie_name,
        state.settings.secure_cookies,
    );
    Ok((
        jar.add(clear),
        Json(serde_json::json!({ "status": "logged_out" })),
    )
        .into_response())
}

// ── Authorize ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    authorization_url: String,
    state: StateToken,
    expires_in: u64,
}

async fn authorize<K: KvStore, P: AuthorizationProvider>(
    state: &AppState<K, P>,
    jar: &CookieJar,
) -> Result<Response, AuthError> {
    let record = resolve_session(state, jar)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    let state_token = StateToken::from(generate_state());
    state
        .sessions()
        .put_state(&state_token, &record.session_id)
        .await?;

    tracing::info!(session_id = %record.session_id, "Authorization started");

    Ok(Json(AuthorizeResponse {
        authorization_url: state.provider.authorization_url(&state_token),
        state: state_token,
        expires_in: state.settings.ttl_secs(),
    })
    .into_response())
}
