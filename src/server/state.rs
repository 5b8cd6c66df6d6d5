use std::sync::Arc;

use super::config::AuthSettings;
use super::store::SessionRepository;
use crate::kv::KvStore;

/// Shared state for session and callback handlers.
pub(super) struct AppState<K, P> {
    pub(super) kv: Arc<K>,
    pub(super) provider: Arc<P>,
    pub(super) settings: AuthSettings,
}

// Manual Clone: avoid derive adding `K: Clone, P: Clone` bounds.
impl<K, P> Clone for AppState<K, P> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            provider: self.provider.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<K: KvStore, P> AppState<K, P> {
    pub(super) fn sessions(&self) -> SessionRepository<'_, K> {
        SessionRepository::new(&self.kv, self.settings.ttl_secs())
    }
}
