//! GUNGNIR Test Utilities
//!
//! Centralized test infrastructure for the GUNGNIR workspace:
//! - Test doubles for providers and connectors
//! - Proptest generators for values and coordinates
//! - Test fixtures for connected providers
//! - Custom assertions for GUNGNIR errors

pub use gungnir_core::{
    BackendError, FieldRead, Fields, GungnirError, GungnirResult, Operation, ProviderConfig,
    Record, RecordKey, Value, ID_KEY,
};
pub use gungnir_storage::{
    BackendAdapter, CacheConfig, CachedProvider, Connector, LmdbConnector, MemoryBackend,
    MemoryConnector, Provider, ProviderExt, StoreProvider,
};

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

// ============================================================================
// TRACING
// ============================================================================

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TEST DOUBLES
// ============================================================================

/// Snapshot of the calls a [`CountingProvider`] forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCalls {
    pub reads: u64,
    pub sets: u64,
    pub clears: u64,
}

/// Provider wrapper that counts every call it forwards.
///
/// Placed under a [`CachedProvider`], it shows which operations the cache
/// actually delegated.
#[derive(Debug, Default)]
pub struct CountingProvider<P> {
    inner: P,
    reads: AtomicU64,
    sets: AtomicU64,
    clears: AtomicU64,
}

impl<P: Provider> CountingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn calls(&self) -> ProviderCalls {
        ProviderCalls {
            reads: self.reads.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            clears: self.clears.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl<P: Provider> Provider for CountingProvider<P> {
    async fn read(&self, table: &str, id: &str, key: &str) -> GungnirResult<FieldRead> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(table, id, key).await
    }

    async fn set(&self, table: &str, id: &str, key: &str, value: Value) -> GungnirResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(table, id, key, value).await
    }

    async fn clear(&self, table: &str, id: &str) -> GungnirResult<bool> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(table, id).await
    }
}

/// Memory connector that refuses a number of connection attempts first.
#[derive(Debug, Default)]
pub struct FaultyConnector {
    inner: MemoryConnector,
    failures_left: AtomicU64,
    attempts: AtomicU64,
}

impl FaultyConnector {
    /// Fail the first `failures` attempts, then connect normally.
    pub fn failing(failures: u64) -> Self {
        Self {
            inner: MemoryConnector::new(),
            failures_left: AtomicU64::new(failures),
            attempts: AtomicU64::new(0),
        }
    }

    /// Never connect.
    pub fn unreachable() -> Self {
        Self::failing(u64::MAX)
    }

    /// Number of connection attempts seen so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The store behind `memory://<name>`, for inspecting side effects.
    pub fn store(&self, name: &str) -> MemoryBackend {
        self.inner.open(name)
    }
}

#[async_trait]
impl Connector for FaultyConnector {
    type Backend = MemoryBackend;

    fn scheme(&self) -> &'static str {
        self.inner.scheme()
    }

    async fn connect(&self, descriptor: &str) -> Result<MemoryBackend, BackendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BackendError::Connection {
                reason: "connection refused".to_string(),
            });
        }
        self.inner.connect(descriptor).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating GUNGNIR values and coordinates.

    use super::*;
    use proptest::prelude::*;

    /// Generate any storable value. Non-finite numbers are rejected on
    /// write, so they are left out here.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            ".{0,24}".prop_map(Value::String),
            (-1.0e12f64..1.0e12f64).prop_map(Value::Number),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::Boolean),
            Just(Value::Null),
        ]
    }

    /// Generate a field key other than `_id`.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,15}"
    }

    /// Generate a table name.
    pub fn arb_table() -> impl Strategy<Value = String> {
        "[a-z]{1,10}"
    }

    /// Generate a record identifier.
    pub fn arb_id() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9-]{1,24}"
    }

    /// Generate a record with a handful of fields.
    pub fn arb_record() -> impl Strategy<Value = Record> {
        (arb_id(), prop::collection::btree_map(arb_key(), arb_value(), 0..8)).prop_map(
            |(id, fields)| {
                let mut record = Record::empty(id);
                record.merge(&fields);
                record
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built providers for common testing scenarios.

    use super::*;
    use tempfile::TempDir;

    /// Build a runtime for driving async code from proptest bodies.
    pub fn test_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime should build")
    }

    /// A connected provider over a private in-memory store.
    pub async fn memory_provider() -> StoreProvider<MemoryConnector> {
        let provider = StoreProvider::new("memory://test", MemoryConnector::new());
        provider.connect().await.expect("memory connect should succeed");
        provider
    }

    /// A cached provider that counts what reaches the store underneath.
    pub async fn counted_cached_provider(
        config: CacheConfig,
    ) -> CachedProvider<CountingProvider<StoreProvider<MemoryConnector>>> {
        CountingProvider::new(memory_provider().await).cached_with(config)
    }

    /// A connected provider over an LMDB environment in a fresh temp dir.
    ///
    /// Keep the `TempDir` alive for as long as the provider is used.
    pub async fn lmdb_provider() -> (StoreProvider<LmdbConnector>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let provider = lmdb_provider_at(&temp_dir).await;
        (provider, temp_dir)
    }

    /// A connected provider over the LMDB environment in `dir`.
    pub async fn lmdb_provider_at(dir: &TempDir) -> StoreProvider<LmdbConnector> {
        let descriptor = format!("lmdb://{}", dir.path().display());
        let provider = StoreProvider::new(descriptor, LmdbConnector::new(10));
        provider.connect().await.expect("lmdb connect should succeed");
        provider
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for GUNGNIR results.

    use super::*;

    /// Assert that a GungnirResult is a NotReady error.
    #[track_caller]
    pub fn assert_not_ready<T: std::fmt::Debug>(result: &GungnirResult<T>) {
        match result {
            Err(GungnirError::NotReady { .. }) => {}
            other => panic!("Expected NotReady error, got: {:?}", other),
        }
    }

    /// Assert that a GungnirResult is a backend error raised during `operation`.
    #[track_caller]
    pub fn assert_backend_error<T: std::fmt::Debug>(
        result: &GungnirResult<T>,
        operation: Operation,
    ) {
        match result {
            Err(GungnirError::Backend { operation: op, .. }) => {
                assert_eq!(*op, operation, "Wrong operation in Backend error");
            }
            other => panic!("Expected Backend error during {}, got: {:?}", operation, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertions::*;

    #[tokio::test]
    async fn test_counting_provider_counts_forwarded_calls() {
        let provider = CountingProvider::new(fixtures::memory_provider().await);
        provider.set("users", "u1", "a", Value::from(1)).await.unwrap();
        provider.get("users", "u1", "a").await.unwrap();
        provider.clear("users", "u1").await.unwrap();

        assert_eq!(
            provider.calls(),
            ProviderCalls {
                reads: 1,
                sets: 1,
                clears: 1
            }
        );
    }

    #[tokio::test]
    async fn test_faulty_connector_recovers_after_failures() {
        let provider = StoreProvider::new("memory://test", FaultyConnector::failing(2));

        assert!(provider.connect().await.is_err());
        assert!(provider.connect().await.is_err());
        assert_not_ready(&provider.get("users", "u1", "a").await);

        provider.connect().await.expect("third attempt should succeed");
        assert!(provider.is_ready());
        assert_eq!(provider.connector().attempts(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_connector_never_connects() {
        let provider = StoreProvider::new("memory://test", FaultyConnector::unreachable());
        for _ in 0..3 {
            let err = provider.connect().await.unwrap_err();
            assert!(matches!(err, GungnirError::ConnectFailed { .. }));
        }
        assert!(!provider.is_ready());
    }

    #[test]
    fn test_assert_backend_error_matches_operation() {
        let result: GungnirResult<()> = Err(GungnirError::backend(
            Operation::Clear,
            "users",
            "u1",
            BackendError::Transaction("boom".to_string()),
        ));
        assert_backend_error(&result, Operation::Clear);
    }
}
