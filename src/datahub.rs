use std::cmp::Reverse;

use serde::Deserialize;
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, PrimitiveDateTime};
use url::Url;

use crate::error::Error;
use crate::server::AuthorizationProvider;
use crate::types::{CustomerId, StateToken};

const DEFAULT_API_URL: &str = "https://api.eloverblik.dk/thirdpartyapi/api/";
const DEFAULT_AUTHORIZE_URL: &str = "https://eloverblik.dk/authorization/authorization";

/// Data provider (Eloverblik third-party API) configuration.
///
/// The refresh token is a constructor parameter; endpoints default to the
/// public production API and can be overridden with `with_*` methods.
#[derive(Clone)]
#[non_exhaustive]
pub struct DataHubConfig {
    pub(crate) refresh_token: String,
    pub(crate) api_url: Url,
    pub(crate) authorize_url: Url,
}

impl std::fmt::Debug for DataHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataHubConfig")
            .field("api_url", &self.api_url.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .finish_non_exhaustive()
    }
}

impl DataHubConfig {
    #[must_use]
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            api_url: DEFAULT_API_URL.parse().expect("valid default URL"),
            authorize_url: DEFAULT_AUTHORIZE_URL.parse().expect("valid default URL"),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ELOVERBLIK_REFRESH_TOKEN`: long-lived third-party refresh token
    ///
    /// # Optional env vars
    /// - `ELOVERBLIK_API_URL`: override the third-party API base
    /// - `ELOVERBLIK_AUTHORIZE_URL`: override the customer consent page
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the refresh token is missing or a URL is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let refresh_token = std::env::var("ELOVERBLIK_REFRESH_TOKEN")
            .map_err(|_| Error::Config("ELOVERBLIK_REFRESH_TOKEN is required".into()))?;
        let mut config = Self::new(refresh_token.trim());

        if let Ok(url_str) = std::env::var("ELOVERBLIK_API_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("ELOVERBLIK_API_URL: {e}")))?;
            config = config.with_api_url(url);
        }
        if let Ok(url_str) = std::env::var("ELOVERBLIK_AUTHORIZE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("ELOVERBLIK_AUTHORIZE_URL: {e}")))?;
            config = config.with_authorize_url(url);
        }
        Ok(config)
    }

    /// Override the API base. A trailing slash is added if missing.
    #[must_use]
    pub fn with_api_url(mut self, mut url: Url) -> Self {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.api_url = url;
        self
    }

    #[must_use]
    pub fn with_authorize_url(mut self, url: Url) -> Self {
        self.authorize_url = url;
        self
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }
}

/// An authorization grant: a customer's consent for this third party to read their data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Authorization {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub third_party_name: Option<String>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, rename = "customerCVR")]
    pub customer_cvr: Option<String>,
    #[serde(default)]
    pub customer_key: Option<String>,
    #[serde(default)]
    pub include_future_metering_points: Option<bool>,
    #[serde(default)]
    pub time_stamp: Option<String>,
}

impl Authorization {
    /// Customer identifier for session linking: `customerKey`, then `customerCVR`, then grant `id`.
    #[must_use]
    pub fn customer_id(&self) -> Option<CustomerId> {
        [&self.customer_key, &self.customer_cvr, &self.id]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(|s| CustomerId::from(s.to_string()))
    }

    /// `timeStamp`, falling back to `validFrom`.
    fn created(&self) -> Option<OffsetDateTime> {
        self.time_stamp
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.valid_from.as_deref().and_then(parse_timestamp))
    }
}

/// Picks the most recently created grant.
///
/// Grants without a parseable timestamp sort last. There is no correlation to
/// the authorization attempt that produced the state token.
#[must_use]
pub fn select_latest(mut grants: Vec<Authorization>) -> Option<Authorization> {
    grants.sort_by_key(|g| Reverse(g.created()));
    grants.into_iter().next()
}

fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Iso8601::DEFAULT)
        .or_else(|_| PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).map(|dt| dt.assume_utc()))
        .ok()
}

#[derive(Deserialize)]
struct ResultEnvelope<T> {
    result: T,
}

/// HTTP client for the third-party data API.
pub struct DataHubClient {
    config: DataHubConfig,
    http: reqwest::Client,
}

impl DataHubClient {
    #[must_use]
    pub fn new(config: DataHubConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.config
            .api_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid API path {path}: {e}")))
    }

    /// Exchange the configured refresh token for a short-lived access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Upstream`] if the token endpoint returns an error.
    pub async fn fetch_access_token(&self) -> Result<String, Error> {
        let response = self
            .http
            .get(self.endpoint("token")?)
            .bearer_auth(&self.config.refresh_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        let envelope: ResultEnvelope<String> = response.json().await?;
        Ok(envelope.result)
    }

    /// List the authorization grants visible to an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Upstream`] if the endpoint returns an error.
    pub async fn fetch_authorizations(&self, access_token: &str) -> Result<Vec<Authorization>, Error> {
        let response = self
            .http
            .get(self.endpoint("authorization/authorizations")?)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "authorization list").await?;
        let envelope: ResultEnvelope<Vec<Authorization>> = response.json().await?;
        Ok(envelope.result)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Upstream {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

impl AuthorizationProvider for DataHubClient {
    fn authorization_url(&self, state: &StateToken) -> String {
        let mut url = self.config.authorize_url.clone();
        url.query_pairs_mut().append_pair("state", state.as_str());
        url.into()
    }

    async fn access_token(&self) -> Result<String, Error> {
        self.fetch_access_token().await
    }

    async fn authorizations(&self, access_token: &str) -> Result<Vec<Authorization>, Error> {
        self.fetch_authorizations(access_token).await
    }
}
