//! Records and record coordinates.
//!
//! A [`Record`] is everything stored for one `(table, id)` pair. The
//! identifier lives outside the field map so that no field write can ever
//! replace it.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BackendError;
use crate::value::{FieldRead, Value};

/// Reserved field key holding a record's identifier.
pub const ID_KEY: &str = "_id";

/// Field map of a record, excluding `_id`.
pub type Fields = BTreeMap<String, Value>;

/// All field values stored for one `(table, id)` pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    id: String,
    fields: Fields,
}

impl Record {
    /// The record a lookup materializes when nothing is stored yet.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    /// A fresh record holding a single field, as created by a first write.
    pub fn with_field(id: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        let mut record = Self::empty(id);
        record.insert(key, value);
        record
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Read one field. `_id` resolves to the identifier.
    pub fn field(&self, key: &str) -> FieldRead {
        if key == ID_KEY {
            return FieldRead::Found(Value::String(self.id.clone()));
        }
        self.fields.get(key).cloned().into()
    }

    /// Set one field. Writes to `_id` are ignored; returns whether the
    /// record changed shape (a new key was added).
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if key == ID_KEY {
            return false;
        }
        self.fields.insert(key, value).is_none()
    }

    /// Merge `fields` into this record. Existing keys not named in `fields`
    /// are kept; `_id` is never touched.
    pub fn merge(&mut self, fields: &Fields) {
        for (key, value) in fields {
            self.insert(key.clone(), value.clone());
        }
    }

    /// Encode as a flat JSON document, `_id` first.
    ///
    /// Fails for non-finite numbers: JSON has no representation for them.
    pub fn to_document(&self) -> Result<Vec<u8>, BackendError> {
        if let Some((key, value)) = self.fields.iter().find(|(_, v)| !v.is_storable()) {
            return Err(BackendError::Serialization(format!(
                "field {} holds non-finite number {}",
                key, value
            )));
        }
        serde_json::to_vec(self).map_err(|e| BackendError::Serialization(e.to_string()))
    }

    /// Decode a document produced by [`Record::to_document`].
    pub fn from_document(bytes: &[u8]) -> Result<Self, BackendError> {
        serde_json::from_slice(bytes).map_err(|e| BackendError::Deserialization(e.to_string()))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(ID_KEY, &self.id)?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Fields::deserialize(deserializer)?;
        match fields.remove(ID_KEY) {
            Some(Value::String(id)) => Ok(Self { id, fields }),
            Some(other) => Err(D::Error::custom(format!(
                "`{}` must be a string, found {}",
                ID_KEY,
                other.kind()
            ))),
            None => Err(D::Error::missing_field(ID_KEY)),
        }
    }
}

/// Separator byte between table and id in an encoded key. Never valid UTF-8.
const SEPARATOR: u8 = 0xFF;

/// Coordinate of a record: `(table, id)`.
///
/// # Binary Format
///
/// `[table bytes][0xFF][id bytes]`. Keys sort by table first, so all records
/// of a table form one contiguous range under [`RecordKey::table_prefix`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    table: String,
    id: String,
}

impl RecordKey {
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Self::table_prefix(&self.table);
        bytes.extend_from_slice(self.id.as_bytes());
        bytes
    }

    /// Decode an encoded key. Returns `None` without a separator or when
    /// either half is not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == SEPARATOR)?;
        let table = std::str::from_utf8(&bytes[..split]).ok()?;
        let id = std::str::from_utf8(&bytes[split + 1..]).ok()?;
        Some(Self::new(table, id))
    }

    /// Prefix shared by every encoded key of `table`.
    pub fn table_prefix(table: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(table.len() + 1);
        prefix.extend_from_slice(table.as_bytes());
        prefix.push(SEPARATOR);
        prefix
    }
}
