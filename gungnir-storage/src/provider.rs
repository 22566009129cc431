//! The provider contract.
//!
//! A provider reads, writes, and clears single fields of records addressed
//! by `(table, id, key)`. Every backend and every decorator implements this
//! one trait, so callers never know which engine (or cache) serves them.

use std::sync::Arc;

use async_trait::async_trait;
use gungnir_core::{FieldRead, GungnirResult, Value};

use crate::cache::{CacheConfig, CachedProvider};

/// Per-field storage access.
///
/// # Contract
///
/// - Every operation fails with `GungnirError::NotReady` until the backend
///   connection is established, and touches no storage in that case.
/// - Reading `_id` yields the identifier; writing `_id` is a no-op.
/// - A record that was never written reads as empty: every field is absent.
/// - `set` merges one field into the record; other fields survive.
/// - `clear` removes the whole record and is idempotent. It returns whether
///   a record existed.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Read one field, keeping "absent" and "stored null" apart.
    async fn read(&self, table: &str, id: &str, key: &str) -> GungnirResult<FieldRead>;

    /// Read one field; absent fields resolve to [`Value::Null`].
    async fn get(&self, table: &str, id: &str, key: &str) -> GungnirResult<Value> {
        Ok(self.read(table, id, key).await?.into_value())
    }

    /// Write one field.
    async fn set(&self, table: &str, id: &str, key: &str, value: Value) -> GungnirResult<()>;

    /// Delete the whole record.
    async fn clear(&self, table: &str, id: &str) -> GungnirResult<bool>;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    async fn read(&self, table: &str, id: &str, key: &str) -> GungnirResult<FieldRead> {
        (**self).read(table, id, key).await
    }

    async fn set(&self, table: &str, id: &str, key: &str, value: Value) -> GungnirResult<()> {
        (**self).set(table, id, key, value).await
    }

    async fn clear(&self, table: &str, id: &str) -> GungnirResult<bool> {
        (**self).clear(table, id).await
    }
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Box<P> {
    async fn read(&self, table: &str, id: &str, key: &str) -> GungnirResult<FieldRead> {
        (**self).read(table, id, key).await
    }

    async fn set(&self, table: &str, id: &str, key: &str, value: Value) -> GungnirResult<()> {
        (**self).set(table, id, key, value).await
    }

    async fn clear(&self, table: &str, id: &str) -> GungnirResult<bool> {
        (**self).clear(table, id).await
    }
}

/// Builds the cached version of any provider.
pub trait ProviderExt: Provider + Sized {
    /// Wrap in a [`CachedProvider`] with default settings.
    fn cached(self) -> CachedProvider<Self> {
        CachedProvider::new(self)
    }

    /// Wrap in a [`CachedProvider`] with explicit settings.
    fn cached_with(self, config: CacheConfig) -> CachedProvider<Self> {
        CachedProvider::with_config(self, config)
    }
}

impl<P: Provider> ProviderExt for P {}
