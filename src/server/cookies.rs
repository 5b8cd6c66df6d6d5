use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Create the session cookie carrying a signed token.
pub(super) fn session_cookie(
    name: &str,
    token: &str,
    ttl: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(ttl)
        .build()
}

/// Reissue the session cookie empty with `Max-Age=0`.
pub(super) fn clear_session_cookie(name: &str, secure: bool) -> Cookie<'static> {
    session_cookie(name, "", Duration::ZERO, secure)
}

/// Get the session token from cookies.
pub(super) fn get_session_token(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
