use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{CustomerId, SessionId};

/// Minimum length of the configured secret, after trimming.
pub const MIN_SECRET_LEN: usize = 32;

/// HMAC key for session tokens.
///
/// Every signer and verifier obtains its key through [`SigningKey::derive`];
/// two call sites deriving from the same secret always agree.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// Derives the signing key from the configured secret.
    ///
    /// The secret is trimmed, then decoded as standard base64 when it is 44 or
    /// 64 characters long or uses only the base64 alphabet. Anything that does
    /// not decode is used as raw UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the trimmed secret is shorter than
    /// [`MIN_SECRET_LEN`] characters.
    pub fn derive(secret: &str) -> Result<Self, Error> {
        let secret = secret.trim();
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "session secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        if looks_like_base64(secret) {
            if let Ok(bytes) = STANDARD.decode(secret) {
                return Ok(Self { bytes });
            }
        }

        Ok(Self {
            bytes: secret.as_bytes().to_vec(),
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

fn looks_like_base64(s: &str) -> bool {
    s.len() == 44
        || s.len() == 64
        || s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
}

/// Claims carried by the `elportal_session` cookie.
///
/// `created_at`/`expires_at` are epoch milliseconds; `iat`/`exp` are the
/// standard JWT seconds used by the signature validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    pub created_at: i64,
    pub expires_at: i64,
    iat: i64,
    exp: i64,
}

impl SessionClaims {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        customer_id: Option<CustomerId>,
        created_at: i64,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Self {
        let expires_at = now_ms + ttl_ms;
        Self {
            session_id,
            customer_id,
            created_at,
            expires_at,
            iat: now_ms / 1000,
            exp: expires_at / 1000,
        }
    }
}

/// Signs session claims as an HS256 JWT.
///
/// # Errors
///
/// Returns [`Error::Token`] if encoding fails.
pub fn sign(claims: &SessionClaims, key: &SigningKey) -> Result<String, Error> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .map_err(|e| Error::Token(e.to_string()))
}

/// Verifies signature and expiry of a session token.
///
/// # Errors
///
/// Returns [`Error::Token`] if the signature does not match `key`, the JWT
/// `exp` has passed, or `expiresAt` is not after `now_ms`.
pub fn verify(token: &str, key: &SigningKey, now_ms: i64) -> Result<SessionClaims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(key.as_bytes()),
        &validation,
    )
    .map_err(|e| Error::Token(e.to_string()))?;

    if data.claims.expires_at <= now_ms {
        return Err(Error::Token("session expired".into()));
    }
    Ok(data.claims)
}
