//! In-process backend.
//!
//! Records live in a `HashMap` behind an `RwLock`. Backends opened through
//! the same [`MemoryConnector`] under the same name share one store, so a
//! reconnect sees earlier writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use gungnir_core::{BackendError, Fields, Record, RecordKey};

use super::{descriptor_target, BackendAdapter, Connector};

/// Per-primitive call counters.
#[derive(Debug, Default)]
struct Calls {
    fetch: AtomicU64,
    insert: AtomicU64,
    update: AtomicU64,
    delete: AtomicU64,
}

/// Snapshot of how often each primitive was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
}

impl CallCounts {
    pub fn total(&self) -> u64 {
        self.fetch + self.insert + self.update + self.delete
    }
}

#[derive(Debug, Default)]
struct MemoryStore {
    records: RwLock<HashMap<RecordKey, Record>>,
    calls: Calls,
}

/// Connected handle to a named in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
}

impl MemoryBackend {
    /// A backend with its own private store.
    pub fn new() -> Self {
        Self::default()
    }

    // Every map operation completes before it can panic, so a poisoned
    // lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<RecordKey, Record>> {
        self.store.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RecordKey, Record>> {
        self.store.records.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored records across all tables.
    pub fn record_count(&self) -> usize {
        self.read().len()
    }

    /// Number of stored records in one table.
    pub fn table_count(&self, table: &str) -> usize {
        self.read().keys().filter(|k| k.table() == table).count()
    }

    /// Remove every stored record.
    pub fn clear_all(&self) {
        self.write().clear();
    }

    /// How often each primitive has been called on this store.
    pub fn calls(&self) -> CallCounts {
        let calls = &self.store.calls;
        CallCounts {
            fetch: calls.fetch.load(Ordering::Relaxed),
            insert: calls.insert.load(Ordering::Relaxed),
            update: calls.update.load(Ordering::Relaxed),
            delete: calls.delete.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl BackendAdapter for MemoryBackend {
    async fn fetch(&self, table: &str, id: &str) -> Result<Option<Record>, BackendError> {
        self.store.calls.fetch.fetch_add(1, Ordering::Relaxed);
        let records = self.read();
        Ok(records.get(&RecordKey::new(table, id)).cloned())
    }

    async fn insert(&self, table: &str, record: &Record) -> Result<(), BackendError> {
        self.store.calls.insert.fetch_add(1, Ordering::Relaxed);
        let key = RecordKey::new(table, record.id());
        let mut records = self.write();
        if records.contains_key(&key) {
            return Err(BackendError::Conflict {
                table: table.to_string(),
                id: record.id().to_string(),
            });
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, fields: &Fields) -> Result<bool, BackendError> {
        self.store.calls.update.fetch_add(1, Ordering::Relaxed);
        let mut records = self.write();
        match records.get_mut(&RecordKey::new(table, id)) {
            Some(record) => {
                record.merge(fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        self.store.calls.delete.fetch_add(1, Ordering::Relaxed);
        let mut records = self.write();
        Ok(records.remove(&RecordKey::new(table, id)).is_some())
    }
}

/// Connector for `memory://<name>` descriptors.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    stores: Arc<RwLock<HashMap<String, MemoryBackend>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the store called `name`, creating it on first use.
    pub fn open(&self, name: &str) -> MemoryBackend {
        if let Some(backend) = self
            .stores
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return backend.clone();
        }
        let mut stores = self.stores.write().unwrap_or_else(|e| e.into_inner());
        stores.entry(name.to_string()).or_default().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Backend = MemoryBackend;

    fn scheme(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, descriptor: &str) -> Result<MemoryBackend, BackendError> {
        let name = descriptor_target(descriptor, self.scheme())?;
        Ok(self.open(name))
    }
}
