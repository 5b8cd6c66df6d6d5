#![doc = include_str!("../README.md")]

pub mod error;
pub mod ids;
pub mod kv;
pub mod token;
pub mod tracking;
pub mod types;

#[cfg(feature = "server")]
pub mod datahub;
#[cfg(feature = "server")]
pub mod server;

// Re-exports for convenient access
pub use error::Error;
pub use ids::{generate_click_id, generate_local_session_id, generate_session_id, generate_state};
pub use kv::{KvError, KvStore, MemoryKv};
pub use token::{SessionClaims, SigningKey};
pub use types::{CustomerId, SessionId, SessionRecord, SessionStatus, StateToken};

#[cfg(feature = "server")]
pub use datahub::{Authorization, DataHubClient, DataHubConfig, select_latest};
#[cfg(feature = "server")]
pub use server::{AuthConfig, AuthError, AuthorizationProvider, auth_routes};
