#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Deployment misconfiguration (bad signing secret, missing credentials).
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Token error: {0}")]
    Token(String),
    #[error("Upstream {operation} failed (status {status:?}): {detail}")]
    Upstream {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "server")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
