//! Backend adapters.
//!
//! A backend adapter exposes exactly four primitives (fetch, insert, update,
//! delete). [`StoreProvider`](crate::StoreProvider) builds the whole provider
//! contract on top of them, so an engine without native upsert support can
//! still serve as a backend.

pub mod lmdb;
pub mod memory;

use async_trait::async_trait;
use gungnir_core::{BackendError, Fields, Record};

pub use lmdb::{LmdbBackend, LmdbConnector};
pub use memory::{CallCounts, MemoryBackend, MemoryConnector};

/// Storage primitives of one connected engine.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Fetch a record by id, or `None` if nothing is stored.
    async fn fetch(&self, table: &str, id: &str) -> Result<Option<Record>, BackendError>;

    /// Insert a new record. Fails with [`BackendError::Conflict`] if a record
    /// with the same id exists.
    async fn insert(&self, table: &str, record: &Record) -> Result<(), BackendError>;

    /// Merge `fields` into an existing record. Returns `false` (and changes
    /// nothing) if there is no such record.
    async fn update(&self, table: &str, id: &str, fields: &Fields) -> Result<bool, BackendError>;

    /// Delete a record. Returns `false` if nothing was stored; that is not
    /// an error.
    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError>;
}

/// Turns a connection descriptor into a connected [`BackendAdapter`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// The connection handle this connector produces.
    type Backend: BackendAdapter;

    /// Descriptor scheme this connector accepts, e.g. `"lmdb"`.
    fn scheme(&self) -> &'static str;

    /// Establish a connection for `descriptor`.
    async fn connect(&self, descriptor: &str) -> Result<Self::Backend, BackendError>;
}

/// Split `scheme://target` and return the target.
pub fn descriptor_target<'a>(descriptor: &'a str, scheme: &str) -> Result<&'a str, BackendError> {
    let invalid = |reason: String| BackendError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason,
    };

    let (found, target) = descriptor
        .split_once("://")
        .ok_or_else(|| invalid("expected <scheme>://<target>".to_string()))?;

    if found != scheme {
        return Err(invalid(format!("expected scheme {}, found {}", scheme, found)));
    }
    if target.is_empty() {
        return Err(invalid("empty target".to_string()));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_target() {
        assert_eq!(descriptor_target("memory://users", "memory").unwrap(), "users");
        assert_eq!(
            descriptor_target("lmdb:///var/lib/gungnir", "lmdb").unwrap(),
            "/var/lib/gungnir"
        );
    }

    #[test]
    fn test_descriptor_target_rejects_mismatches() {
        for descriptor in ["mongodb://localhost", "memory:users", "memory://"] {
            let err = descriptor_target(descriptor, "memory").unwrap_err();
            assert!(
                matches!(err, BackendError::InvalidDescriptor { .. }),
                "{descriptor} should be rejected"
            );
        }
    }
}
