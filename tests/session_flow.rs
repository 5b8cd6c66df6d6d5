use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, RETRY_AFTER, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use elportal_auth::datahub::Authorization;
use elportal_auth::kv::{KvStore, MemoryKv};
use elportal_auth::server::{AuthConfig, AuthorizationProvider, RateLimitConfig, auth_routes};
use elportal_auth::{Error, StateToken};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "integration-test-session-secret-0123456789";

#[derive(Clone, Default)]
struct StubProvider {
    grants: Vec<Authorization>,
    fail: bool,
}

impl StubProvider {
    fn with_grants(grants: Vec<Value>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|g| serde_json::from_value(g).unwrap())
                .collect(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            grants: Vec::new(),
            fail: true,
        }
    }
}

impl AuthorizationProvider for StubProvider {
    fn authorization_url(&self, state: &StateToken) -> String {
        format!("https://provider.test/consent?state={state}")
    }

    async fn access_token(&self) -> Result<String, Error> {
        if self.fail {
            return Err(Error::Upstream {
                operation: "token",
                status: Some(503),
                detail: "unavailable".into(),
            });
        }
        Ok("access".into())
    }

    async fn authorizations(&self, _access_token: &str) -> Result<Vec<Authorization>, Error> {
        Ok(self.grants.clone())
    }
}

fn one_grant() -> StubProvider {
    StubProvider::with_grants(vec![json!({
        "id": "grant-1",
        "customerKey": "cust-1",
        "timeStamp": "2024-05-01T12:00:00Z"
    })])
}

fn config() -> AuthConfig {
    AuthConfig::new(SECRET)
        .with_secure_cookies(false)
        .with_app_redirect("/tilsluttet")
        .with_error_redirect("/fejl")
}

fn app(kv: &Arc<MemoryKv>, provider: StubProvider) -> Router {
    auth_routes(config(), kv.clone(), provider)
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// `name=value` of the session cookie set by a response.
fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("elportal_session="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

/// Run `init` and return `(session_id, cookie)`.
async fn init(app: &Router) -> (String, String) {
    let response = send(app, request("POST", "/api/auth/session?action=init", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("init sets the session cookie");
    let body = json_body(response).await;
    (body["sessionId"].as_str().unwrap().to_string(), cookie)
}

async fn verify(app: &Router, cookie: Option<&str>) -> Value {
    let response = send(app, request("GET", "/api/auth/session?action=verify", cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn insert_state(kv: &MemoryKv, state: &str, session_id: &str) {
    kv.set(
        &format!("state:{state}"),
        &json!({ "sessionId": session_id }).to_string(),
        86_400,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn init_creates_pending_session() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());

    let response = send(&app, request("POST", "/api/auth/session?action=init", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Max-Age=86400"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "created");
    assert_eq!(body["expiresIn"], 86_400);
    let session_id = body["sessionId"].as_str().unwrap();
    assert_eq!(session_id.len(), 43);

    let stored: Value =
        serde_json::from_str(&kv.get(&format!("session:{session_id}")).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(stored["status"], "pending_authorization");
    assert_eq!(stored["customerId"], Value::Null);
}

#[tokio::test]
async fn verify_reports_pending_session() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, cookie) = init(&app).await;

    let body = verify(&app, Some(&cookie)).await;
    assert_eq!(
        body,
        json!({ "authenticated": true, "sessionId": session_id, "hasAuthorization": false })
    );
}

#[tokio::test]
async fn verify_without_valid_cookie_is_anonymous() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (_, cookie) = init(&app).await;

    assert_eq!(verify(&app, None).await, json!({ "authenticated": false }));

    let tampered = format!("{cookie}x");
    assert_eq!(verify(&app, Some(&tampered)).await, json!({ "authenticated": false }));

    let other_key = auth_routes(
        AuthConfig::new("a-completely-different-secret-of-enough-length"),
        kv.clone(),
        one_grant(),
    );
    assert_eq!(verify(&other_key, Some(&cookie)).await, json!({ "authenticated": false }));
}

#[tokio::test]
async fn callback_links_session_to_customer() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, _) = init(&app).await;
    insert_state(&kv, "state-1", &session_id).await;

    let response = send(&app, request("GET", "/api/auth/callback?state=state-1", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let cookie = session_cookie(&response).expect("callback reissues the session cookie");
    let page = text_body(response).await;
    assert!(page.contains(r#"sessionStorage.setItem("eloverblik_customer_id", "cust-1")"#));
    assert!(page.contains("/tilsluttet"));

    let stored: Value =
        serde_json::from_str(&kv.get(&format!("session:{session_id}")).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(stored["status"], "authorized");
    assert_eq!(stored["customerId"], "cust-1");
    assert!(stored["authorizedAt"].is_i64());
    assert_eq!(
        kv.get(&format!("session:{session_id}:customer")).await.unwrap().as_deref(),
        Some("cust-1")
    );
    assert_eq!(
        kv.get("customer:cust-1:session").await.unwrap().as_deref(),
        Some(session_id.as_str())
    );
    assert_eq!(kv.get("state:state-1").await.unwrap(), None);

    let body = verify(&app, Some(&cookie)).await;
    assert_eq!(
        body,
        json!({
            "authenticated": true,
            "sessionId": session_id,
            "hasAuthorization": true,
            "customerId": "cust-1"
        })
    );
}

#[tokio::test]
async fn replayed_state_is_rejected() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, _) = init(&app).await;
    insert_state(&kv, "once", &session_id).await;

    let first = send(&app, request("GET", "/api/auth/callback?state=once", None)).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, request("GET", "/api/auth/callback?state=once", None)).await;
    assert_eq!(second.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&second), "/fejl?error=invalid_state");
    assert!(session_cookie(&second).is_none());
}

/// Rewrite a stored record so its `expiresAt` has passed while the store
/// entry itself stays live.
async fn expire_record(kv: &MemoryKv, session_id: &str) {
    let key = format!("session:{session_id}");
    let mut record: Value = serde_json::from_str(&kv.get(&key).await.unwrap().unwrap()).unwrap();
    record["expiresAt"] = json!(1_000);
    kv.set(&key, &record.to_string(), 86_400).await.unwrap();
}

#[tokio::test]
async fn verify_rejects_record_past_expires_at() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, cookie) = init(&app).await;
    assert_eq!(verify(&app, Some(&cookie)).await["authenticated"], true);

    expire_record(&kv, &session_id).await;
    assert!(kv.get(&format!("session:{session_id}")).await.unwrap().is_some());
    assert_eq!(verify(&app, Some(&cookie)).await, json!({ "authenticated": false }));
}

#[tokio::test]
async fn callback_rejects_record_past_expires_at() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, _) = init(&app).await;
    expire_record(&kv, &session_id).await;
    insert_state(&kv, "late", &session_id).await;

    let response = send(&app, request("GET", "/api/auth/callback?state=late", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/fejl?error=no_session");
    assert!(session_cookie(&response).is_none());
    assert_eq!(kv.get("customer:cust-1:session").await.unwrap(), None);
}

#[tokio::test]
async fn callback_does_not_relink_authorized_session() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, _) = init(&app).await;
    insert_state(&kv, "first", &session_id).await;
    let response = send(&app, request("GET", "/api/auth/callback?state=first", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let other_customer = auth_routes(
        config(),
        kv.clone(),
        StubProvider::with_grants(vec![json!({ "id": "g2", "customerKey": "cust-2" })]),
    );
    insert_state(&kv, "second", &session_id).await;
    let response = send(
        &other_customer,
        request("GET", "/api/auth/callback?state=second", None),
    )
    .await;
    assert_eq!(location(&response), "/fejl?error=no_session");

    let stored: Value =
        serde_json::from_str(&kv.get(&format!("session:{session_id}")).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(stored["customerId"], "cust-1");
    assert_eq!(
        kv.get("customer:cust-1:session").await.unwrap().as_deref(),
        Some(session_id.as_str())
    );
    assert_eq!(kv.get("customer:cust-2:session").await.unwrap(), None);
}

#[tokio::test]
async fn callback_error_categories() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());

    let response = send(&app, request("GET", "/api/auth/callback", None)).await;
    assert_eq!(location(&response), "/fejl?error=missing_state");

    let response = send(&app, request("GET", "/api/auth/callback?state=", None)).await;
    assert_eq!(location(&response), "/fejl?error=missing_state");

    kv.set("state:broken", "not json", 60).await.unwrap();
    let response = send(&app, request("GET", "/api/auth/callback?state=broken", None)).await;
    assert_eq!(location(&response), "/fejl?error=invalid_state");

    insert_state(&kv, "orphan", "no-such-session").await;
    let response = send(&app, request("GET", "/api/auth/callback?state=orphan", None)).await;
    assert_eq!(location(&response), "/fejl?error=no_session");
}

#[tokio::test]
async fn callback_without_grants() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, StubProvider::default());
    let (session_id, cookie) = init(&app).await;
    insert_state(&kv, "s", &session_id).await;

    let response = send(&app, request("GET", "/api/auth/callback?state=s", None)).await;
    assert_eq!(location(&response), "/fejl?error=no_authorizations");

    let body = verify(&app, Some(&cookie)).await;
    assert_eq!(body["hasAuthorization"], false);
    assert_eq!(kv.get("state:s").await.unwrap(), None);
}

#[tokio::test]
async fn provider_failure_is_generic() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, StubProvider::failing());
    let (session_id, _) = init(&app).await;
    insert_state(&kv, "s", &session_id).await;

    let response = send(&app, request("GET", "/api/auth/callback?state=s", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/fejl?error=callback_failed");

    let stored: Value =
        serde_json::from_str(&kv.get(&format!("session:{session_id}")).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(stored["status"], "pending_authorization");
}

#[tokio::test]
async fn newest_grant_wins() {
    let kv = Arc::new(MemoryKv::new());
    let provider = StubProvider::with_grants(vec![
        json!({ "id": "g1", "customerKey": "older", "timeStamp": "2024-01-01T00:00:00Z" }),
        json!({ "id": "g2", "customerKey": "newer", "validFrom": "2024-06-01T00:00:00Z" }),
    ]);
    let app = app(&kv, provider);
    let (session_id, _) = init(&app).await;
    insert_state(&kv, "s", &session_id).await;

    let response = send(&app, request("GET", "/api/auth/callback?state=s", None)).await;
    let cookie = session_cookie(&response).unwrap();
    assert_eq!(verify(&app, Some(&cookie)).await["customerId"], "newer");
}

#[tokio::test]
async fn logout_removes_session_and_mappings() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());
    let (session_id, _) = init(&app).await;
    insert_state(&kv, "s", &session_id).await;
    let response = send(&app, request("GET", "/api/auth/callback?state=s", None)).await;
    let cookie = session_cookie(&response).unwrap();

    let response = send(
        &app,
        request("DELETE", "/api/auth/session?action=logout", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("elportal_session=;"));
    assert!(set_cookie.contains("Max-Age=0"));
    assert_eq!(json_body(response).await, json!({ "status": "logged_out" }));

    assert_eq!(kv.get(&format!("session:{session_id}")).await.unwrap(), None);
    assert_eq!(kv.get(&format!("session:{session_id}:customer")).await.unwrap(), None);
    assert_eq!(kv.get("customer:cust-1:session").await.unwrap(), None);

    assert_eq!(verify(&app, Some(&cookie)).await, json!({ "authenticated": false }));
}

#[tokio::test]
async fn logout_without_session_still_clears_cookie() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());

    let response = send(&app, request("POST", "/api/auth/session?action=logout", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn authorize_issues_state_for_callback() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());

    let response = send(&app, request("POST", "/api/auth/session?action=authorize", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (session_id, cookie) = init(&app).await;
    let response = send(
        &app,
        request("POST", "/api/auth/session?action=authorize", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let state = body["state"].as_str().unwrap();
    assert_eq!(
        body["authorizationUrl"],
        format!("https://provider.test/consent?state={state}")
    );
    assert_eq!(body["expiresIn"], 86_400);

    let response = send(
        &app,
        request("GET", &format!("/api/auth/callback?state={state}"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        kv.get("customer:cust-1:session").await.unwrap().as_deref(),
        Some(session_id.as_str())
    );
}

#[tokio::test]
async fn bad_secret_is_configuration_error() {
    let kv = Arc::new(MemoryKv::new());
    let app = auth_routes(AuthConfig::new("too-short"), kv.clone(), one_grant());

    let response = send(&app, request("POST", "/api/auth/session?action=init", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await, json!({ "error": "Configuration error" }));
}

#[tokio::test]
async fn action_and_method_errors() {
    let kv = Arc::new(MemoryKv::new());
    let app = app(&kv, one_grant());

    let response = send(&app, request("POST", "/api/auth/session?action=explode", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "Invalid action" }));

    let response = send(&app, request("GET", "/api/auth/session", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, request("GET", "/api/auth/session?action=init", None)).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json_body(response).await, json!({ "error": "Method not allowed" }));

    let response = send(&app, request("POST", "/api/auth/session?action=verify", None)).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn init_is_rate_limited_per_client() {
    let kv = Arc::new(MemoryKv::new());
    let config = config().with_rate_limit(RateLimitConfig {
        enabled: true,
        window_secs: 60,
        max: 2,
    });
    let app = auth_routes(config, kv.clone(), one_grant());

    let from = |ip: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/auth/session?action=init")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app, from("203.0.113.7")).await.status(), StatusCode::OK);
    assert_eq!(send(&app, from("203.0.113.7")).await.status(), StatusCode::OK);

    let limited = send(&app, from("203.0.113.7")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()[RETRY_AFTER], "60");

    assert_eq!(send(&app, from("198.51.100.1")).await.status(), StatusCode::OK);
}
