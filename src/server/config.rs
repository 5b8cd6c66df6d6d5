use time::Duration;

use super::error::AuthError;
use super::rate_limit::RateLimitConfig;
use crate::token::SigningKey;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) session_secret: String,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) app_redirect: String,
    pub(crate) error_redirect: String,
    pub(crate) rate_limit: RateLimitConfig,
    pub(crate) dev_mode: bool,
}

impl AuthSettings {
    fn defaults(session_secret: String) -> Self {
        Self {
            session_secret,
            session_cookie_name: "elportal_session".into(),
            session_ttl: Duration::hours(24),
            secure_cookies: true,
            auth_path: "/api/auth".into(),
            app_redirect: "/".into(),
            error_redirect: "/".into(),
            rate_limit: RateLimitConfig::default(),
            dev_mode: false,
        }
    }

    /// Derive the signing key. Called per request so that a bad secret
    /// surfaces as a configuration error rather than a startup crash.
    pub(crate) fn signing_key(&self) -> Result<SigningKey, AuthError> {
        SigningKey::derive(&self.session_secret).map_err(AuthError::from)
    }

    pub(crate) fn ttl_ms(&self) -> i64 {
        self.session_ttl.whole_milliseconds() as i64
    }

    pub(crate) fn ttl_secs(&self) -> u64 {
        self.session_ttl.whole_seconds().max(0) as u64
    }
}

/// Session service configuration.
///
/// The signing secret is a constructor parameter; everything else has a
/// default and can be overridden with the `with_*` methods.
pub struct AuthConfig {
    pub(super) settings: AuthSettings,
}

impl AuthConfig {
    #[must_use]
    pub fn new(session_secret: impl Into<String>) -> Self {
        Self {
            settings: AuthSettings::defaults(session_secret.into()),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Env vars
    /// - `SESSION_SECRET`: token signing secret (≥32 chars, base64 or UTF-8).
    ///   Not validated here; an invalid secret makes session endpoints
    ///   answer with a configuration error.
    /// - `DEV_AUTH`: `"1"` or `"true"` disables secure cookies
    /// - `APP_REDIRECT`: where the callback sends the browser on success
    /// - `ERROR_REDIRECT`: where the callback sends the browser on failure
    /// - `RATE_LIMIT_MAX`, `RATE_LIMIT_WINDOW_SECS`: session-creation limit per client
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, AuthError> {
        let secret = std::env::var("SESSION_SECRET").unwrap_or_default();

        let dev_auth = matches!(
            std::env::var("DEV_AUTH").as_deref(),
            Ok("1") | Ok("true"),
        );

        let mut config = Self::new(secret)
            .with_secure_cookies(!dev_auth)
            .with_dev_mode(dev_auth);

        if let Ok(path) = std::env::var("APP_REDIRECT") {
            config = config.with_app_redirect(path);
        }
        if let Ok(path) = std::env::var("ERROR_REDIRECT") {
            config = config.with_error_redirect(path);
        }

        let mut rate_limit = RateLimitConfig::default();
        if let Ok(max) = std::env::var("RATE_LIMIT_MAX") {
            rate_limit.max = max
                .parse()
                .map_err(|e| AuthError::Config(format!("RATE_LIMIT_MAX: {e}")))?;
        }
        if let Ok(window) = std::env::var("RATE_LIMIT_WINDOW_SECS") {
            rate_limit.window_secs = window
                .parse()
                .map_err(|e| AuthError::Config(format!("RATE_LIMIT_WINDOW_SECS: {e}")))?;
        }

        Ok(config.with_rate_limit(rate_limit))
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_app_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.app_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_error_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.error_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.settings.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.settings.dev_mode = enabled;
        self
    }

    /// Local development mode (`DEV_AUTH`).
    #[must_use]
    pub fn dev_mode(&self) -> bool {
        self.settings.dev_mode
    }

    /// Check the signing secret without serving a request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the secret is unusable.
    pub fn validate(&self) -> Result<(), AuthError> {
        self.settings.signing_key().map(|_| ())
    }
}
