use std::future::Future;

use crate::datahub::Authorization;
use crate::error::Error;
use crate::types::StateToken;

/// External data provider that grants access to a customer's data.
///
/// [`DataHubClient`](crate::datahub::DataHubClient) is the production
/// implementation; tests substitute a stub.
///
/// # Example
///
/// ```rust,ignore
/// impl AuthorizationProvider for StubProvider {
///     fn authorization_url(&self, state: &StateToken) -> String {
///         format!("https://provider.test/consent?state={state}")
///     }
///
///     async fn access_token(&self) -> Result<String, Error> {
///         Ok("access".into())
///     }
///
///     async fn authorizations(&self, _: &str) -> Result<Vec<Authorization>, Error> {
///         Ok(self.grants.clone())
///     }
/// }
/// ```
pub trait AuthorizationProvider: Send + Sync + 'static {
    /// Consent page the browser is sent to, carrying the one-time `state`.
    fn authorization_url(&self, state: &StateToken) -> String;

    /// Exchange the configured refresh token for a short-lived access token.
    fn access_token(&self) -> impl Future<Output = Result<String, Error>> + Send;

    /// All grants visible to `access_token`.
    fn authorizations(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<Authorization>, Error>> + Send;
}
