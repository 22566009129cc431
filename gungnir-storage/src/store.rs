//! Provider over any backend adapter.
//!
//! [`StoreProvider`] owns the connection lifecycle and implements the
//! provider contract with the four backend primitives:
//!
//! - `get`: one `fetch`, materializing an empty record when nothing is stored
//! - `set`: a `fetch` existence check, then `insert` (no record) or `update`
//!   (record exists). An `update` that matches nothing falls back to `insert`.
//! - `clear`: one `delete`

use std::sync::Arc;

use async_trait::async_trait;
use gungnir_core::{
    BackendError, FieldRead, Fields, GungnirError, GungnirResult, Operation, ProviderConfig,
    Record, Value, ID_KEY,
};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;

use crate::backend::{BackendAdapter, Connector};
use crate::provider::Provider;

/// Connection lifecycle of a provider. Moves one way: `Connecting -> Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }
}

/// Provider backed by a connector's backend.
///
/// Construction never blocks: the provider starts `Connecting` and every
/// operation fails with `NotReady` until [`StoreProvider::connect`] succeeds.
/// The connection handle is set once and never replaced.
///
/// # Example
///
/// ```ignore
/// let provider = StoreProvider::new("lmdb:///var/lib/gungnir", LmdbConnector::default());
/// provider.connect().await?;
///
/// provider.set("users", "u1", "name", "ada".into()).await?;
/// assert_eq!(provider.get("users", "u1", "name").await?, Value::from("ada"));
/// ```
pub struct StoreProvider<C: Connector> {
    descriptor: String,
    connector: C,
    backend: OnceCell<C::Backend>,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> StoreProvider<C> {
    /// Create a provider in the `Connecting` state.
    pub fn new(descriptor: impl Into<String>, connector: C) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            descriptor: descriptor.into(),
            connector,
            backend: OnceCell::new(),
            state,
        }
    }

    /// Create a provider for the descriptor in `config`.
    pub fn from_config(config: &ProviderConfig, connector: C) -> Self {
        Self::new(config.uri.clone(), connector)
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// The connection handle, once connected.
    pub fn backend(&self) -> Option<&C::Backend> {
        self.backend.get()
    }

    /// Establish the backend connection.
    ///
    /// Concurrent callers share a single attempt. Once connected, further
    /// calls return immediately. A failed attempt leaves the provider
    /// `Connecting`, so it may be retried.
    pub async fn connect(&self) -> GungnirResult<()> {
        if self.backend.initialized() {
            return Ok(());
        }

        tracing::debug!(descriptor = %self.descriptor, "Connecting provider backend");
        self.backend
            .get_or_try_init(|| self.connector.connect(&self.descriptor))
            .await
            .map_err(|source| {
                tracing::warn!(
                    descriptor = %self.descriptor,
                    error = %source,
                    "Provider backend connection failed"
                );
                GungnirError::connect_failed(&self.descriptor, source)
            })?;

        if self.state.send_replace(ConnectionState::Ready) == ConnectionState::Connecting {
            tracing::info!(descriptor = %self.descriptor, "Provider backend ready");
        }
        Ok(())
    }

    /// Wait until another task has completed [`StoreProvider::connect`].
    pub async fn wait_ready(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only ends once ready.
        let _ = rx.wait_for(|state| state.is_ready()).await;
    }

    fn ready_backend(&self) -> GungnirResult<&C::Backend> {
        self.backend
            .get()
            .ok_or_else(|| GungnirError::not_ready(&self.descriptor))
    }
}

impl<C> StoreProvider<C>
where
    C: Connector + 'static,
    C::Backend: 'static,
{
    /// Start connecting in the background and return immediately.
    ///
    /// Operations issued before the spawned task finishes fail with
    /// `NotReady`; use [`StoreProvider::wait_ready`] to wait for it.
    pub fn spawn_connect(self: Arc<Self>) -> JoinHandle<GungnirResult<()>> {
        tokio::spawn(async move { self.connect().await })
    }
}

fn context(operation: Operation, table: &str, id: &str) -> impl FnOnce(BackendError) -> GungnirError {
    let table = table.to_string();
    let id = id.to_string();
    move |source| GungnirError::backend(operation, table, id, source)
}

#[async_trait]
impl<C: Connector> Provider for StoreProvider<C> {
    async fn read(&self, table: &str, id: &str, key: &str) -> GungnirResult<FieldRead> {
        let backend = self.ready_backend()?;
        if key == ID_KEY {
            return Ok(FieldRead::Found(Value::String(id.to_string())));
        }

        let record = backend
            .fetch(table, id)
            .await
            .map_err(context(Operation::Get, table, id))?
            .unwrap_or_else(|| Record::empty(id));

        tracing::debug!(table, id, key, fields = record.len(), "Read field");
        Ok(record.field(key))
    }

    async fn set(&self, table: &str, id: &str, key: &str, value: Value) -> GungnirResult<()> {
        let backend = self.ready_backend()?;
        if key == ID_KEY {
            tracing::debug!(table, id, "Ignoring write to record identifier");
            return Ok(());
        }

        if !value.is_storable() {
            let reason = format!("field {} holds non-finite number {}", key, value);
            return Err(GungnirError::backend(
                Operation::Set,
                table,
                id,
                BackendError::Serialization(reason),
            ));
        }

        let existing = backend
            .fetch(table, id)
            .await
            .map_err(context(Operation::Set, table, id))?;

        if existing.is_some() {
            tracing::debug!(table, id, key, kind = value.kind(), "Updating record");
            let mut fields = Fields::new();
            fields.insert(key.to_string(), value.clone());
            let matched = backend
                .update(table, id, &fields)
                .await
                .map_err(context(Operation::Set, table, id))?;
            if matched {
                return Ok(());
            }
            tracing::warn!(table, id, key, "Record cleared concurrently; recreating it");
        } else {
            tracing::debug!(table, id, key, kind = value.kind(), "Creating record");
        }

        let record = Record::with_field(id, key, value);
        backend.insert(table, &record).await.map_err(|source| {
            if matches!(source, BackendError::Conflict { .. }) {
                tracing::warn!(table, id, key, "Record created concurrently; write rejected");
            }
            context(Operation::Set, table, id)(source)
        })?;
        Ok(())
    }

    async fn clear(&self, table: &str, id: &str) -> GungnirResult<bool> {
        let backend = self.ready_backend()?;
        let deleted = backend
            .delete(table, id)
            .await
            .map_err(context(Operation::Clear, table, id))?;

        tracing::debug!(table, id, deleted, "Cleared record");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryConnector};
    use crate::provider::ProviderExt;
    use std::time::Duration;

    /// What a [`ScriptedBackend`] answers to `fetch`, regardless of storage.
    #[derive(Debug, Clone, Copy)]
    enum FetchAnswer {
        Absent,
        Present,
    }

    /// Memory backend whose `fetch` is out of date, standing in for a
    /// concurrent writer that acts between the existence check and the write.
    #[derive(Debug, Clone)]
    struct ScriptedBackend {
        inner: MemoryBackend,
        answer: FetchAnswer,
    }

    #[async_trait]
    impl BackendAdapter for ScriptedBackend {
        async fn fetch(&self, _table: &str, id: &str) -> Result<Option<Record>, BackendError> {
            match self.answer {
                FetchAnswer::Absent => Ok(None),
                FetchAnswer::Present => Ok(Some(Record::empty(id))),
            }
        }

        async fn insert(&self, table: &str, record: &Record) -> Result<(), BackendError> {
            self.inner.insert(table, record).await
        }

        async fn update(&self, table: &str, id: &str, fields: &Fields) -> Result<bool, BackendError> {
            self.inner.update(table, id, fields).await
        }

        async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
            self.inner.delete(table, id).await
        }
    }

    struct ScriptedConnector {
        backend: ScriptedBackend,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Backend = ScriptedBackend;

        fn scheme(&self) -> &'static str {
            "memory"
        }

        async fn connect(&self, _descriptor: &str) -> Result<ScriptedBackend, BackendError> {
            Ok(self.backend.clone())
        }
    }

    async fn scripted_provider(answer: FetchAnswer) -> (StoreProvider<ScriptedConnector>, MemoryBackend) {
        let inner = MemoryBackend::new();
        let connector = ScriptedConnector {
            backend: ScriptedBackend {
                inner: inner.clone(),
                answer,
            },
        };
        let provider = StoreProvider::new("memory://scripted", connector);
        provider.connect().await.expect("connect should succeed");
        (provider, inner)
    }

    async fn ready_provider() -> StoreProvider<MemoryConnector> {
        let provider = StoreProvider::new("memory://test", MemoryConnector::new());
        provider.connect().await.expect("connect should succeed");
        provider
    }

    fn store_of(provider: &StoreProvider<MemoryConnector>) -> MemoryBackend {
        provider.connector().open("test")
    }

    #[tokio::test]
    async fn test_starts_connecting() {
        let provider = StoreProvider::new("memory://test", MemoryConnector::new());
        assert_eq!(provider.state(), ConnectionState::Connecting);
        assert!(!provider.is_ready());
        assert!(provider.backend().is_none());
        assert_eq!(provider.descriptor(), "memory://test");
    }

    #[tokio::test]
    async fn test_connect_flips_to_ready() {
        let provider = ready_provider().await;
        assert_eq!(provider.state(), ConnectionState::Ready);
        assert!(provider.backend().is_some());

        // Reconnecting is a no-op.
        provider.connect().await.expect("second connect should succeed");
        assert!(provider.is_ready());
    }

    #[tokio::test]
    async fn test_operations_fail_before_ready_without_side_effects() {
        let provider = StoreProvider::new("memory://test", MemoryConnector::new());

        let err = provider.get("users", "u1", "name").await.unwrap_err();
        assert!(err.is_not_ready());
        let err = provider.get("users", "u1", ID_KEY).await.unwrap_err();
        assert!(err.is_not_ready());
        let err = provider
            .set("users", "u1", "name", Value::from("ada"))
            .await
            .unwrap_err();
        assert!(err.is_not_ready());
        let err = provider.clear("users", "u1").await.unwrap_err();
        assert!(err.is_not_ready());

        let store = store_of(&provider);
        assert_eq!(store.calls().total(), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_stays_connecting() {
        let provider = StoreProvider::new("lmdb:///tmp/nope", MemoryConnector::new());
        let err = provider.connect().await.unwrap_err();
        assert!(matches!(err, GungnirError::ConnectFailed { .. }));
        assert_eq!(provider.state(), ConnectionState::Connecting);
        assert!(provider.get("users", "u1", "a").await.unwrap_err().is_not_ready());
    }

    #[tokio::test]
    async fn test_spawn_connect_and_wait_ready() {
        let provider = Arc::new(StoreProvider::new("memory://test", MemoryConnector::new()));
        let handle = Arc::clone(&provider).spawn_connect();

        tokio::time::timeout(Duration::from_secs(5), provider.wait_ready())
            .await
            .expect("provider should become ready");
        assert!(provider.is_ready());
        handle
            .await
            .expect("connect task should not panic")
            .expect("connect should succeed");
    }

    #[tokio::test]
    async fn test_id_reads_without_touching_storage() {
        let provider = ready_provider().await;
        let value = provider.get("users", "u1", ID_KEY).await.unwrap();
        assert_eq!(value, Value::from("u1"));
        assert_eq!(store_of(&provider).calls().fetch, 0);
    }

    #[tokio::test]
    async fn test_id_writes_are_ignored() {
        let provider = ready_provider().await;
        provider
            .set("users", "u1", ID_KEY, Value::from("u2"))
            .await
            .unwrap();

        assert_eq!(provider.get("users", "u1", ID_KEY).await.unwrap(), Value::from("u1"));
        let store = store_of(&provider);
        assert_eq!(store.calls().total(), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_absent_field_reads_null() {
        let provider = ready_provider().await;
        assert_eq!(provider.get("users", "fresh", "anyKey").await.unwrap(), Value::Null);
        assert_eq!(
            provider.read("users", "fresh", "anyKey").await.unwrap(),
            FieldRead::Absent
        );
    }

    #[tokio::test]
    async fn test_first_write_inserts_then_updates() {
        let provider = ready_provider().await;
        provider.set("users", "u1", "a", Value::from(1)).await.unwrap();
        provider.set("users", "u1", "b", Value::from(2)).await.unwrap();

        let calls = store_of(&provider).calls();
        assert_eq!(calls.insert, 1);
        assert_eq!(calls.update, 1);
        assert_eq!(calls.fetch, 2);

        assert_eq!(provider.get("users", "u1", "a").await.unwrap(), Value::from(1));
        assert_eq!(provider.get("users", "u1", "b").await.unwrap(), Value::from(2));
    }

    #[tokio::test]
    async fn test_stored_null_reads_as_found() {
        let provider = ready_provider().await;
        provider.set("users", "u1", "nick", Value::Null).await.unwrap();

        assert_eq!(
            provider.read("users", "u1", "nick").await.unwrap(),
            FieldRead::Found(Value::Null)
        );
        assert_eq!(provider.get("users", "u1", "nick").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_clear_resets_and_is_idempotent() {
        let provider = ready_provider().await;
        provider.set("users", "u1", "a", Value::from(1)).await.unwrap();

        assert!(provider.clear("users", "u1").await.unwrap());
        assert_eq!(provider.get("users", "u1", "a").await.unwrap(), Value::Null);
        assert!(!provider.clear("users", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_lands_when_record_cleared_after_check() {
        let (provider, store) = scripted_provider(FetchAnswer::Present).await;
        provider.set("users", "u1", "name", Value::from("ada")).await.unwrap();

        let calls = store.calls();
        assert_eq!((calls.update, calls.insert), (1, 1));
        let record = store
            .fetch("users", "u1")
            .await
            .unwrap()
            .expect("record should be recreated");
        assert_eq!(record.field("name").into_value(), Value::from("ada"));
    }

    #[tokio::test]
    async fn test_cache_matches_store_when_record_cleared_after_check() {
        let (provider, store) = scripted_provider(FetchAnswer::Present).await;
        let cache = provider.cached();
        cache.set("users", "u1", "name", Value::from("ada")).await.unwrap();

        let stored = store
            .fetch("users", "u1")
            .await
            .unwrap()
            .map(|record| record.field("name"));
        assert_eq!(stored, Some(cache.read("users", "u1", "name").await.unwrap()));
    }

    #[tokio::test]
    async fn test_concurrent_create_surfaces_conflict() {
        let (provider, store) = scripted_provider(FetchAnswer::Absent).await;
        store
            .insert("users", &Record::with_field("u1", "name", Value::from("ada")))
            .await
            .unwrap();

        let err = provider
            .set("users", "u1", "name", Value::from("grace"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GungnirError::Backend {
                operation: Operation::Set,
                source: BackendError::Conflict { .. },
                ..
            }
        ));

        let record = store.fetch("users", "u1").await.unwrap().unwrap();
        assert_eq!(record, Record::with_field("u1", "name", Value::from("ada")));
    }

    #[tokio::test]
    async fn test_conflicting_write_is_not_cached() {
        let (provider, store) = scripted_provider(FetchAnswer::Absent).await;
        store.insert("users", &Record::empty("u1")).await.unwrap();
        let cache = provider.cached();

        assert!(cache.set("users", "u1", "name", Value::from("grace")).await.is_err());
        assert!(!cache.is_cached("users", "u1"));
    }

    #[tokio::test]
    async fn test_non_finite_numbers_are_rejected() {
        let provider = ready_provider().await;
        provider.set("users", "u1", "score", Value::from(1.5)).await.unwrap();
        let calls_before = store_of(&provider).calls();

        for n in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = provider
                .set("users", "u1", "score", Value::Number(n))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                GungnirError::Backend {
                    operation: Operation::Set,
                    source: BackendError::Serialization(_),
                    ..
                }
            ));
        }

        assert_eq!(store_of(&provider).calls(), calls_before);
        assert_eq!(provider.get("users", "u1", "score").await.unwrap(), Value::from(1.5));
    }

    #[tokio::test]
    async fn test_tables_are_independent() {
        let provider = ready_provider().await;
        provider.set("users", "1", "name", Value::from("ada")).await.unwrap();
        provider.set("teams", "1", "name", Value::from("core")).await.unwrap();

        assert_eq!(provider.get("users", "1", "name").await.unwrap(), Value::from("ada"));
        assert_eq!(provider.get("teams", "1", "name").await.unwrap(), Value::from("core"));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::backend::MemoryConnector;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[a-z0-9 ]{0,12}".prop_map(Value::String),
            (-1.0e9f64..1.0e9f64).prop_map(Value::Number),
            any::<bool>().prop_map(Value::Boolean),
            Just(Value::Null),
        ]
    }

    fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,8}"
    }

    fn run<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime should build")
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any sequence of writes to one record reads back as the last
        /// write per key; untouched keys stay absent.
        #[test]
        fn prop_last_write_per_key_wins(
            writes in prop::collection::vec((arb_key(), arb_value()), 1..16),
            lookup in arb_key(),
        ) {
            let observed = run(async {
                let provider = StoreProvider::new("memory://prop", MemoryConnector::new());
                provider.connect().await?;

                let mut model = BTreeMap::new();
                for (key, value) in &writes {
                    provider.set("users", "u1", key, value.clone()).await?;
                    model.insert(key.clone(), value.clone());
                }

                let mut reads = Vec::new();
                for key in model.keys() {
                    reads.push((key.clone(), provider.get("users", "u1", key).await?));
                }
                let lookup_read = provider.read("users", "u1", &lookup).await?;
                GungnirResult::Ok((model, reads, lookup_read))
            });

            let (model, reads, lookup_read) = observed.expect("operations should succeed");
            for (key, value) in reads {
                prop_assert_eq!(Some(&value), model.get(&key));
            }
            prop_assert_eq!(lookup_read.is_found(), model.contains_key(&lookup));
        }

        /// `_id` always reads back as the identifier, whatever was written to it.
        #[test]
        fn prop_id_is_immutable(id in "[a-z0-9]{1,12}", attempt in arb_value()) {
            let read = run(async {
                let provider = StoreProvider::new("memory://prop", MemoryConnector::new());
                provider.connect().await?;
                provider.set("users", &id, ID_KEY, attempt).await?;
                provider.get("users", &id, ID_KEY).await
            });
            prop_assert_eq!(read.expect("operations should succeed"), Value::String(id));
        }
    }
}
