//! GUNGNIR Core - Values, Records, Errors
//!
//! Pure data types shared by every provider and backend. Storage behavior
//! lives in `gungnir-storage`.

pub mod config;
pub mod error;
pub mod record;
pub mod value;

pub use config::{ProviderConfig, DEFAULT_LMDB_MAX_SIZE_MB, DEFAULT_PROVIDER_URI};
pub use error::{BackendError, ConfigError, GungnirError, GungnirResult, Operation};
pub use record::{Fields, Record, RecordKey, ID_KEY};
pub use value::{FieldRead, Value};
