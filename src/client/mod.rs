//! Store client seam.
//!
//! The persistence layer talks to the backing store exclusively through the
//! traits in this module: a connector that turns a resolved URI into a
//! cluster handle, a cluster that performs admin operations and opens
//! buckets, and a bucket that performs key and query operations.
//!
//! The crate ships one implementation, the in-memory backend in
//! [`memory`], which doubles as the test harness for everything built on
//! top of the seam.

pub mod memory;

pub use memory::{MemoryCluster, MemoryConnector};

use crate::config::BucketKind;
use crate::query::QueryConsistency;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Compare-and-swap token returned by reads and mutations.
///
/// `0` means "unconditional" when passed to [`Bucket::replace`].
pub type Cas = u64;

/// Settings for an auto-created bucket.
#[derive(Debug, Clone)]
pub struct BucketSettings {
    /// Bucket name.
    pub name: String,
    /// Bucket type.
    pub kind: BucketKind,
    /// RAM quota in megabytes.
    pub ram_quota_mb: u64,
    /// Whether full-bucket flush is permitted.
    pub flush_enabled: bool,
}

/// One opened bucket.
///
/// Key operations signal a missing document with
/// [`Error::KeyNotFound`](crate::Error::KeyNotFound) and an occupied key
/// with [`Error::KeyAlreadyExists`](crate::Error::KeyAlreadyExists);
/// normalizing not-found to `None` is the caller's concern.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// The bucket name.
    fn name(&self) -> &str;

    /// Stores a new document; fails if the key already exists.
    async fn insert(&self, key: &str, document: Value) -> Result<Cas>;

    /// Stores a document, replacing any existing one.
    async fn upsert(&self, key: &str, document: Value) -> Result<Cas>;

    /// Replaces an existing document; fails if the key is absent.
    ///
    /// A non-zero `cas` makes the replace conditional on the document not
    /// having changed since it was read.
    async fn replace(&self, key: &str, document: Value, cas: Cas) -> Result<Cas>;

    /// Reads a document and its CAS token.
    async fn get(&self, key: &str) -> Result<(Value, Cas)>;

    /// Reads many documents in one round trip.
    ///
    /// The result preserves key order; each entry carries that key's
    /// individual outcome.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Result<(Value, Cas)>>>;

    /// Removes a document; fails if the key is absent.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Executes a query statement with the given scan consistency.
    ///
    /// `SELECT *` rows are the stored documents; `COUNT(*)` and `DELETE`
    /// statements yield a single row exposing the affected count under the
    /// `$1` column.
    async fn query(&self, statement: &str, consistency: QueryConsistency) -> Result<Vec<Value>>;
}

/// One connected cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Authenticates against the cluster.
    async fn authenticate(&self, username: &str, password: &str) -> Result<()>;

    /// Creates a bucket; fails with
    /// [`Error::KeyAlreadyExists`](crate::Error::KeyAlreadyExists) if one
    /// with the same name exists.
    async fn create_bucket(&self, settings: BucketSettings) -> Result<()>;

    /// Opens a bucket by name.
    async fn open_bucket(&self, name: &str) -> Result<Arc<dyn Bucket>>;

    /// Creates the primary index on a bucket. Idempotent.
    async fn create_primary_index(&self, bucket: &str) -> Result<()>;

    /// Flushes all documents from a bucket. Requires flush to be enabled
    /// on the bucket.
    async fn flush_bucket(&self, bucket: &str) -> Result<()>;
}

/// Turns a resolved connection URI into a cluster handle.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Establishes a connection to the cluster addressed by `uri`.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn ClusterClient>>;
}
