//! Generic and identity-indexed persistence over one bucket.

use crate::Result;
use crate::connect::ClusterConnection;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

mod generic;
mod identifiable;

pub use generic::GenericPersistence;
pub use identifiable::IdentifiablePersistence;

/// Marker for types that can be stored as documents.
///
/// Blanket-implemented; any serde-capable, cloneable, thread-safe type
/// qualifies, including `serde_json::Value` for map-shaped records.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Record with a string identity field.
///
/// The identity must live under the `id` field of the record's serialized
/// form; partial updates re-assert that field to keep a patch from changing
/// a record's identity.
pub trait Identifiable: Record {
    /// The record id; empty means "not assigned yet".
    fn id(&self) -> String;

    /// Assigns the record id.
    fn set_id(&mut self, id: String);
}

/// Map-shaped records carry their identity in an `id` field. `set_id` is a
/// no-op on non-object values; such values are rejected at write time.
impl Identifiable for Value {
    fn id(&self) -> String {
        self.get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn set_id(&mut self, id: String) {
        if let Value::Object(map) = self {
            map.insert("id".to_string(), Value::String(id));
        }
    }
}

/// Paging instructions for filtered queries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PagingParams {
    /// Number of leading results to skip; renders an `OFFSET` clause only
    /// when set.
    pub skip: Option<u64>,
    /// Page size; defaults to the configured maximum page size.
    pub take: Option<u64>,
    /// Request the page total in the result.
    pub total: bool,
}

impl PagingParams {
    /// Paging with an explicit skip and take.
    #[must_use]
    pub const fn new(skip: u64, take: u64, total: bool) -> Self {
        Self {
            skip: Some(skip),
            take: Some(take),
            total,
        }
    }
}

/// One page of query results.
///
/// `total` is populated only when [`PagingParams::total`] was requested and
/// reports the size of this page, not of the whole result set.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    /// Records on this page, in query order.
    pub data: Vec<T>,
    /// Page total, when requested.
    pub total: Option<u64>,
}

/// Connection used by a persistence component.
///
/// An owned connection is opened and closed together with the component; a
/// shared connection is managed by its owner and only borrowed.
pub enum ConnectionHandle {
    /// Connection created by and exclusive to one component.
    Owned(ClusterConnection),
    /// Connection shared between several components.
    Shared(Arc<ClusterConnection>),
}

impl ConnectionHandle {
    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &ClusterConnection {
        match self {
            Self::Owned(connection) => connection,
            Self::Shared(connection) => connection,
        }
    }

    pub(crate) const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owned(connection) => f.debug_tuple("Owned").field(connection).finish(),
            Self::Shared(connection) => f.debug_tuple("Shared").field(connection).finish(),
        }
    }
}

pub(crate) fn to_document<T: Record>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

pub(crate) fn from_document<T: Record>(document: Value) -> Result<T> {
    Ok(serde_json::from_value(document)?)
}

/// JSON kind name used in [`crate::Error::InvalidDocument`] messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
