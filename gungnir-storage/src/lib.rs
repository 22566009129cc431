//! GUNGNIR Storage - Provider Contract, Backends, and Cache
//!
//! Defines the per-field provider abstraction, the backend adapters it runs
//! on, and the caching decorator that can wrap any provider.

pub mod backend;
pub mod cache;
pub mod provider;
pub mod store;

use std::sync::Arc;

pub use backend::{
    descriptor_target, BackendAdapter, CallCounts, Connector, LmdbBackend, LmdbConnector,
    MemoryBackend, MemoryConnector,
};
pub use cache::{CacheConfig, CacheStats, CachedProvider, GateGuard, RecordGate};
pub use provider::{Provider, ProviderExt};
pub use store::{ConnectionState, StoreProvider};

use gungnir_core::{BackendError, GungnirError, GungnirResult, ProviderConfig};

/// Build and connect the provider described by `config`.
///
/// The descriptor scheme selects the backend (`memory` or `lmdb`). The
/// result is wrapped in a [`CachedProvider`] when caching is enabled.
pub async fn connect_from_config(config: &ProviderConfig) -> GungnirResult<Arc<dyn Provider>> {
    match config.scheme() {
        Some("memory") => {
            let provider = StoreProvider::from_config(config, MemoryConnector::new());
            finish(provider, config).await
        }
        Some("lmdb") => {
            let connector = LmdbConnector::new(config.lmdb_max_size_mb);
            finish(StoreProvider::from_config(config, connector), config).await
        }
        other => Err(GungnirError::connect_failed(
            &config.uri,
            BackendError::InvalidDescriptor {
                descriptor: config.uri.clone(),
                reason: match other {
                    Some(scheme) => format!("unsupported scheme {}", scheme),
                    None => "expected <scheme>://<target>".to_string(),
                },
            },
        )),
    }
}

async fn finish<C>(
    provider: StoreProvider<C>,
    config: &ProviderConfig,
) -> GungnirResult<Arc<dyn Provider>>
where
    C: Connector + 'static,
    C::Backend: 'static,
{
    provider.connect().await?;

    if config.cache_enabled {
        Ok(Arc::new(provider.cached_with(CacheConfig::from(config))))
    } else {
        Ok(Arc::new(provider))
    }
}
