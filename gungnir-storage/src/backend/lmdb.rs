//! LMDB-backed persistent backend.
//!
//! Uses the heed crate (Rust bindings for LMDB). Every record is one entry in
//! a single unnamed database:
//!
//! - key: [`RecordKey::encode`] (`table ++ 0xFF ++ id`)
//! - value: the record's flat JSON document
//!
//! # Transactions
//!
//! - `fetch` uses a read transaction
//! - `insert`, `update`, and `delete` each run in one write transaction, so
//!   the existence check and the write of a single primitive are atomic

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gungnir_core::{BackendError, Fields, Record, RecordKey, DEFAULT_LMDB_MAX_SIZE_MB};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::{descriptor_target, BackendAdapter, Connector};

fn txn_error(e: heed::Error) -> BackendError {
    BackendError::Transaction(e.to_string())
}

/// Connected handle to an LMDB environment.
///
/// # Example
///
/// ```ignore
/// let backend = LmdbConnector::new(64).connect("lmdb:///var/lib/gungnir").await?;
/// backend.insert("users", &Record::with_field("u1", "name", "ada".into())).await?;
/// ```
#[derive(Clone)]
pub struct LmdbBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbBackend {
    /// Open (creating if needed) the environment at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_size_mb` does not fit in bytes
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, BackendError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| BackendError::Connection {
                reason: format!("map size of {} MB overflows", max_size_mb),
            })?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| BackendError::Connection {
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| BackendError::Connection {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records stored in `table`.
    pub fn record_count(&self, table: &str) -> Result<usize, BackendError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let prefix = RecordKey::table_prefix(table);
        let iter = self.db.prefix_iter(&rtxn, &prefix).map_err(txn_error)?;

        let mut count = 0;
        for entry in iter {
            entry.map_err(txn_error)?;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl BackendAdapter for LmdbBackend {
    async fn fetch(&self, table: &str, id: &str) -> Result<Option<Record>, BackendError> {
        let key = RecordKey::new(table, id).encode();
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        match self.db.get(&rtxn, &key).map_err(txn_error)? {
            Some(bytes) => Ok(Some(Record::from_document(bytes)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, table: &str, record: &Record) -> Result<(), BackendError> {
        let key = RecordKey::new(table, record.id()).encode();
        let document = record.to_document()?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        if self.db.get(&wtxn, &key).map_err(txn_error)?.is_some() {
            return Err(BackendError::Conflict {
                table: table.to_string(),
                id: record.id().to_string(),
            });
        }
        self.db.put(&mut wtxn, &key, &document).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    async fn update(&self, table: &str, id: &str, fields: &Fields) -> Result<bool, BackendError> {
        let key = RecordKey::new(table, id).encode();

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut record = match self.db.get(&wtxn, &key).map_err(txn_error)? {
            Some(bytes) => Record::from_document(bytes)?,
            None => return Ok(false),
        };
        record.merge(fields);

        let document = record.to_document()?;
        self.db.put(&mut wtxn, &key, &document).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(true)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        let key = RecordKey::new(table, id).encode();

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, &key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }
}

/// Connector for `lmdb://<path>` descriptors.
#[derive(Debug, Clone)]
pub struct LmdbConnector {
    max_size_mb: usize,
}

impl Default for LmdbConnector {
    fn default() -> Self {
        Self::new(DEFAULT_LMDB_MAX_SIZE_MB)
    }
}

impl LmdbConnector {
    pub fn new(max_size_mb: usize) -> Self {
        Self { max_size_mb }
    }

    pub fn max_size_mb(&self) -> usize {
        self.max_size_mb
    }
}

#[async_trait]
impl Connector for LmdbConnector {
    type Backend = LmdbBackend;

    fn scheme(&self) -> &'static str {
        "lmdb"
    }

    async fn connect(&self, descriptor: &str) -> Result<LmdbBackend, BackendError> {
        let path = descriptor_target(descriptor, self.scheme())?;
        LmdbBackend::open(path, self.max_size_mb)
    }
}
