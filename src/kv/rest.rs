use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use super::{KvError, KvStore};

/// [`KvStore`] over an Upstash-compatible Redis REST endpoint.
///
/// Commands are posted as JSON arrays with bearer authentication.
/// `take` uses `GETDEL` and `set_many` runs as one `MULTI/EXEC` transaction.
#[derive(Debug, Clone)]
pub struct RestKv {
    http: reqwest::Client,
    url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: JsonValue,
    #[serde(default)]
    error: Option<String>,
}

impl RestKv {
    #[must_use]
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            token: token.into(),
        }
    }

    /// Create from `KV_REST_API_URL` and `KV_REST_API_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if either variable is missing or the URL is invalid.
    pub fn from_env() -> Result<Self, crate::Error> {
        let url = std::env::var("KV_REST_API_URL")
            .map_err(|_| crate::Error::Config("KV_REST_API_URL is required".into()))?;
        let url: Url = url
            .parse()
            .map_err(|e| crate::Error::Config(format!("KV_REST_API_URL: {e}")))?;
        let token = std::env::var("KV_REST_API_TOKEN")
            .map_err(|_| crate::Error::Config("KV_REST_API_TOKEN is required".into()))?;
        Ok(Self::new(url, token))
    }

    /// Use a custom HTTP client (for connection pool reuse).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn post(&self, url: Url, body: &JsonValue) -> Result<reqwest::Response, KvError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(KvError::Command(format!("status {status}: {body}")))
    }

    async fn command(&self, args: &[&str]) -> Result<JsonValue, KvError> {
        let body = JsonValue::from(args.to_vec());
        let response = self.post(self.url.clone(), &body).await?;
        let parsed: CommandResponse = response
            .json()
            .await
            .map_err(|e| KvError::Response(e.to_string()))?;
        match parsed.error {
            Some(error) => Err(KvError::Command(error)),
            None => Ok(parsed.result),
        }
    }

    fn transaction_url(&self) -> Result<Url, KvError> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| KvError::Connection("KV URL cannot be a base".into()))?
            .pop_if_empty()
            .push("multi-exec");
        Ok(url)
    }
}

fn optional_string(value: JsonValue) -> Result<Option<String>, KvError> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => Ok(Some(s)),
        other => Err(KvError::Response(format!("expected string, got {other}"))),
    }
}

impl KvStore for RestKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        optional_string(self.command(&["GET", key]).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let ttl = ttl_secs.max(1).to_string();
        self.command(&["SET", key, value, "EX", &ttl]).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.command(&["DEL", key]).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64, KvError> {
        let count = self
            .command(&["INCR", key])
            .await?
            .as_i64()
            .ok_or_else(|| KvError::Response("INCR returned a non-integer".into()))?;
        if count == 1 {
            let ttl = ttl_secs.max(1).to_string();
            self.command(&["EXPIRE", key, &ttl]).await?;
        }
        Ok(count)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        optional_string(self.command(&["GETDEL", key]).await?)
    }

    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> Result<(), KvError> {
        let ttl = ttl_secs.max(1).to_string();
        let commands: Vec<JsonValue> = entries
            .iter()
            .map(|(key, value)| {
                JsonValue::from(vec![
                    "SET".to_string(),
                    key.clone(),
                    value.clone(),
                    "EX".to_string(),
                    ttl.clone(),
                ])
            })
            .collect();

        let response = self
            .post(self.transaction_url()?, &JsonValue::Array(commands))
            .await?;
        let results: Vec<CommandResponse> = response
            .json()
            .await
            .map_err(|e| KvError::Response(e.to_string()))?;
        if let Some(error) = results.into_iter().find_map(|r| r.error) {
            return Err(KvError::Command(error));
        }
        Ok(())
    }
}
