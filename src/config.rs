//! Configuration data model for persistence components.
//!
//! Plain structs with serde `Deserialize` so a whole [`StoreConfig`] can be
//! pulled out of a larger application config file. Parameter parsing and
//! dependency wiring live outside this crate; only the recognized options
//! and their defaults are modeled here.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Default maximum page size for filtered queries.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// Default RAM quota in megabytes for auto-created buckets.
pub const DEFAULT_RAM_QUOTA_MB: u64 = 100;

/// Default settle delay in milliseconds after creating a bucket.
///
/// The backing store needs time to materialize a freshly created bucket
/// before it can be opened.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// One configured connection endpoint.
///
/// An endpoint either carries a full `uri` (in which case composition is
/// skipped and the URI is used verbatim) or a `host`/`port` pair plus an
/// optional `database` (bucket) path segment. Any additional `params` not
/// consumed by composition are rendered into the URI query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    /// Full resource URI or connection string with all parameters in it.
    #[serde(default)]
    pub uri: Option<String>,
    /// Host name or IP address.
    #[serde(default)]
    pub host: Option<String>,
    /// Port number.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database (bucket) name used as the URI path segment.
    #[serde(default)]
    pub database: Option<String>,
    /// Key to retrieve the endpoint from an external discovery service.
    #[serde(default)]
    pub discovery_key: Option<String>,
    /// Leftover options rendered as `key=value` query-string parameters.
    /// A key with an empty value is rendered without `=`.
    #[serde(default, flatten)]
    pub params: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Endpoint from a host/port pair and a database name.
    #[must_use]
    pub fn from_host(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            database: Some(database.into()),
            ..Self::default()
        }
    }

    /// Endpoint from a full URI; composition returns it verbatim.
    #[must_use]
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }
}

/// Credentials used to authenticate against the cluster.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialConfig {
    /// User name.
    #[serde(default)]
    pub username: Option<String>,
    /// User password.
    #[serde(default)]
    pub password: Option<String>,
    /// Key to retrieve the credentials from an external credential store.
    #[serde(default)]
    pub store_key: Option<String>,
}

impl CredentialConfig {
    /// Credentials from a username/password pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            store_key: None,
        }
    }
}

/// Bucket type selected when auto-creating a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// Persistent, replicated bucket.
    #[default]
    Couchbase,
    /// In-memory cache bucket.
    Memcached,
    /// In-memory bucket with views/query support.
    Ephemeral,
}

impl BucketKind {
    /// Parses a bucket-type string; unrecognized values fall back to
    /// [`BucketKind::Couchbase`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "memcached" => Self::Memcached,
            "ephemeral" => Self::Ephemeral,
            _ => Self::Couchbase,
        }
    }
}

/// Behavioral options for the connection lifecycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Automatically create a missing bucket on open.
    pub auto_create: bool,
    /// Automatically create a primary index on open.
    pub auto_index: bool,
    /// Enable flush on auto-created buckets (required by `clear`).
    pub flush_enabled: bool,
    /// Bucket type for auto-created buckets.
    pub bucket_type: BucketKind,
    /// RAM quota in megabytes for auto-created buckets.
    pub ram_quota: u64,
    /// Wait after creating a bucket before opening it, in milliseconds.
    pub settle_delay_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_create: false,
            auto_index: true,
            flush_enabled: true,
            bucket_type: BucketKind::default(),
            ram_quota: DEFAULT_RAM_QUOTA_MB,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

/// Full configuration for a persistence component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Physical bucket name.
    pub bucket: Option<String>,
    /// Logical collection name inside the bucket.
    pub collection: Option<String>,
    /// Configured connection endpoints, in order.
    pub connections: Vec<ConnectionConfig>,
    /// Optional credentials.
    pub credential: Option<CredentialConfig>,
    /// Lifecycle options.
    pub options: ConnectionOptions,
    /// Maximum page size for filtered queries.
    pub max_page_size: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            collection: None,
            connections: Vec::new(),
            credential: None,
            options: ConnectionOptions::default(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    /// Config with a single host/port endpoint and a bucket name matching
    /// the endpoint database.
    #[must_use]
    pub fn from_host(host: impl Into<String>, port: u16, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            bucket: Some(bucket.clone()),
            connections: vec![ConnectionConfig::from_host(host, port, bucket)],
            ..Self::default()
        }
    }

    /// Config with a single full-URI endpoint.
    #[must_use]
    pub fn from_uri(uri: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            connections: vec![ConnectionConfig::from_uri(uri)],
            ..Self::default()
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credential(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credential = Some(CredentialConfig::new(username, password));
        self
    }

    /// Sets the logical collection name.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Replaces the lifecycle options.
    #[must_use]
    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }
}
