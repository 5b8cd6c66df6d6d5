//! Session service and authorization callback for Axum.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use elportal_auth::datahub::{DataHubClient, DataHubConfig};
//! use elportal_auth::kv::RestKv;
//! use elportal_auth::server::{AuthConfig, auth_routes};
//!
//! let config = AuthConfig::from_env()?;
//! let provider = DataHubClient::new(DataHubConfig::from_env()?);
//! let kv = RestKv::from_env()?;
//!
//! let app = axum::Router::new().merge(auth_routes(config, kv, provider));
//! ```
//!
//! Routes, under `auth_path` (default `/api/auth`):
//!
//! | Route | Method | Purpose |
//! |---|---|---|
//! | `/session?action=init` | POST | create a pending session, set the cookie |
//! | `/session?action=verify` | GET | report session and customer linkage |
//! | `/session?action=authorize` | POST | issue a state token and the provider consent URL |
//! | `/session?action=logout` | POST, DELETE | delete the session, clear the cookie |
//! | `/callback?state=` | GET | link the session to the consenting customer |

mod callback;
mod config;
mod cookies;
mod error;
mod extractor;
mod rate_limit;
mod routes;
mod state;
mod store;
mod traits;

pub use callback::CUSTOMER_STORAGE_KEY;
pub use config::AuthConfig;
pub use error::AuthError;
pub use extractor::ClientIp;
pub use rate_limit::RateLimitConfig;
pub use routes::auth_routes;
pub use traits::AuthorizationProvider;
