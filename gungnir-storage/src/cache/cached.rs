//! Caching decorator for any provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use gungnir_core::{FieldRead, GungnirResult, ProviderConfig, RecordKey, Value, ID_KEY};

use super::gate::{GateGuard, RecordGate};
use super::stats::CacheStats;
use crate::provider::Provider;

type Entries = HashMap<RecordKey, HashMap<String, FieldRead>>;

/// Configuration for the caching decorator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Hold a per-record gate for the whole duration of every operation.
    pub serialize_per_record: bool,
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable per-record serialization.
    pub fn with_record_serialization(mut self, enabled: bool) -> Self {
        self.serialize_per_record = enabled;
        self
    }
}

impl From<&ProviderConfig> for CacheConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self::new().with_record_serialization(config.cache_serialize_per_record)
    }
}

/// Provider decorator that memoizes fields per (table, id).
///
/// The wrapped provider stays the source of truth: misses read through it,
/// writes go through it before the cache is touched, and `clear` always
/// evicts. Errors from the wrapped provider are returned unchanged.
///
/// Without per-record serialization, concurrent operations on the same record
/// are unordered and a slow miss may cache a value older than a concurrent
/// write. Enable [`CacheConfig::serialize_per_record`] when one process has
/// concurrent writers to the same record.
///
/// # Example
///
/// ```ignore
/// let provider = StoreProvider::new("memory://app", MemoryConnector::new()).cached();
/// provider.inner().connect().await?;
///
/// provider.set("users", "u1", "name", "ada".into()).await?;
/// // Served from the cache
/// let name = provider.get("users", "u1", "name").await?;
/// ```
pub struct CachedProvider<P> {
    inner: P,
    config: CacheConfig,
    entries: RwLock<Entries>,
    gate: Option<RecordGate>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<P: Provider> CachedProvider<P> {
    /// Wrap `inner` with default settings.
    pub fn new(inner: P) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    pub fn with_config(inner: P, config: CacheConfig) -> Self {
        let gate = config.serialize_per_record.then(RecordGate::new);
        Self {
            inner,
            config,
            entries: RwLock::new(HashMap::new()),
            gate,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Unwrap, discarding the cache.
    pub fn into_inner(self) -> P {
        self.inner
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries().len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Whether anything is cached for (table, id).
    pub fn is_cached(&self, table: &str, id: &str) -> bool {
        self.entries().contains_key(&RecordKey::new(table, id))
    }

    /// Drop the entry for (table, id). Returns whether one existed.
    pub fn invalidate(&self, table: &str, id: &str) -> bool {
        self.evict(&RecordKey::new(table, id))
    }

    /// Drop every entry of `table`. Returns the number dropped.
    pub fn invalidate_table(&self, table: &str) -> u64 {
        let mut entries = self.entries_mut();
        let before = entries.len();
        entries.retain(|key, _| key.table() != table);
        let dropped = (before - entries.len()) as u64;
        self.evictions.fetch_add(dropped, Ordering::Relaxed);
        dropped
    }

    /// Drop every entry. Returns the number dropped.
    pub fn invalidate_all(&self) -> u64 {
        let mut entries = self.entries_mut();
        let dropped = entries.len() as u64;
        entries.clear();
        self.evictions.fetch_add(dropped, Ordering::Relaxed);
        dropped
    }

    fn entries(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, key: &RecordKey) -> Option<GateGuard<'_>> {
        match &self.gate {
            Some(gate) => Some(gate.acquire(key).await),
            None => None,
        }
    }

    fn lookup(&self, key: &RecordKey, field: &str) -> Option<FieldRead> {
        self.entries().get(key).and_then(|fields| fields.get(field)).cloned()
    }

    fn store(&self, key: RecordKey, field: &str, read: FieldRead) {
        self.entries_mut()
            .entry(key)
            .or_default()
            .insert(field.to_string(), read);
    }

    fn evict(&self, key: &RecordKey) -> bool {
        let evicted = self.entries_mut().remove(key).is_some();
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }
}

#[async_trait]
impl<P: Provider> Provider for CachedProvider<P> {
    async fn read(&self, table: &str, id: &str, key: &str) -> GungnirResult<FieldRead> {
        if key == ID_KEY {
            return self.inner.read(table, id, key).await;
        }

        let record_key = RecordKey::new(table, id);
        let _gate = self.enter(&record_key).await;

        if let Some(cached) = self.lookup(&record_key, key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(table, id, key, "Cache hit");
            return Ok(cached);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(table, id, key, "Cache miss");
        let read = self.inner.read(table, id, key).await?;
        self.store(record_key, key, read.clone());
        Ok(read)
    }

    async fn set(&self, table: &str, id: &str, key: &str, value: Value) -> GungnirResult<()> {
        if key == ID_KEY {
            return self.inner.set(table, id, key, value).await;
        }

        let record_key = RecordKey::new(table, id);
        let _gate = self.enter(&record_key).await;

        self.inner.set(table, id, key, value.clone()).await?;
        self.store(record_key, key, FieldRead::Found(value));
        Ok(())
    }

    async fn clear(&self, table: &str, id: &str) -> GungnirResult<bool> {
        let record_key = RecordKey::new(table, id);
        let _gate = self.enter(&record_key).await;

        let result = self.inner.clear(table, id).await;
        // Evict on failure too: the stored state is unknown.
        self.evict(&record_key);
        if let Err(e) = &result {
            tracing::debug!(table, id, error = %e, "Clear failed; cache entry evicted");
        }
        result
    }
}
