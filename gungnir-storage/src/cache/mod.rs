//! Caching decorator for providers.
//!
//! [`CachedProvider`] wraps any [`Provider`](crate::Provider) and keeps a
//! process-local copy of the fields it has read or written, keyed by
//! (table, id). There is no expiry: entries leave the cache only through
//! `clear` or explicit invalidation.
//!
//! # Example
//!
//! ```ignore
//! let provider = store.cached_with(CacheConfig::new().with_record_serialization(true));
//!
//! provider.set("users", "u1", "name", "ada".into()).await?;
//! provider.get("users", "u1", "name").await?;
//! assert_eq!(provider.stats().hits, 1);
//! ```

pub mod cached;
pub mod gate;
pub mod stats;

pub use cached::{CacheConfig, CachedProvider};
pub use gate::{GateGuard, RecordGate};
pub use stats::CacheStats;
