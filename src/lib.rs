//! # Couchkit
//!
//! A generic data-access layer that maps identifiable records onto documents
//! in a single-bucket key-value/document store.
//!
//! Couchkit adds query, paging, and partial-update semantics on top of a
//! plain cluster connection:
//!
//! - [`ConnectionResolver`] composes configured endpoints and credentials
//!   into one connection URI (pure, no network I/O)
//! - [`ClusterConnection`] owns the open/close lifecycle of one cluster
//!   connection and one opened bucket, including optional bucket creation
//!   and primary-index setup
//! - [`GenericPersistence`] provides filtered queries, paging, random
//!   sampling, and bulk delete over any serde-serializable record type
//! - [`IdentifiablePersistence`] adds identity-indexed CRUD and multiplexes
//!   several logical collections inside one physical bucket via a tag field
//!
//! ## Example
//!
//! ```rust,ignore
//! use couchkit::{IdentifiablePersistence, StoreConfig};
//!
//! let config = StoreConfig::from_host("localhost", 8091, "test");
//! let mut persistence = IdentifiablePersistence::<Dummy>::new(&config, "dummies")?;
//! persistence.open("123").await?;
//! let created = persistence.create("123", dummy).await?;
//! ```

#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod client;
pub mod config;
pub mod connect;
pub mod id;
pub mod persistence;
pub mod query;

// Re-exports for convenience
pub use client::{Bucket, BucketSettings, Cas, ClusterClient, ClusterConnector};
pub use config::{
    BucketKind, ConnectionConfig, ConnectionOptions, CredentialConfig, StoreConfig,
};
pub use connect::{ClusterConnection, ConnectionParams, ConnectionResolver};
pub use id::IdGenerator;
pub use persistence::{
    ConnectionHandle, GenericPersistence, Identifiable, IdentifiablePersistence, Page,
    PagingParams, Record,
};
pub use query::QueryConsistency;

/// Error type for couchkit operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Config` | Missing endpoints, endpoint without host/port, empty bucket name |
/// | `InvalidState` | Operation attempted in the wrong lifecycle state |
/// | `Connection` | Connect, open-bucket, or flush failure |
/// | `KeyAlreadyExists` | Insert on an occupied key |
/// | `KeyNotFound` | Replace on an absent key (key-based gets/deletes normalize this to `None`) |
/// | `CasMismatch` | Conditional replace lost a concurrent update race |
/// | `Query` | Statement execution failure |
/// | `InvalidDocument` | Record did not serialize to a JSON object |
/// | `Serialization` | Record ⇄ document conversion failure |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Missing or invalid configuration.
    ///
    /// Raised when:
    /// - No connection endpoints are configured (`NO_CONNECTION`)
    /// - An endpoint lacks both a URI and a host (`NO_HOST`)
    /// - An endpoint lacks both a URI and a port (`NO_PORT`)
    /// - A persistence component is built without a bucket or collection name
    #[error("config error [{code}]: {message}")]
    Config {
        /// Stable machine-readable code.
        code: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// Operation attempted in the wrong lifecycle state.
    ///
    /// Raised when a persistence operation runs before the component is
    /// opened, or when `clear` is called on a closed connection
    /// (`NOT_OPENED`).
    #[error("invalid state [{code}]: {message}")]
    InvalidState {
        /// Stable machine-readable code.
        code: &'static str,
        /// Human-readable description.
        message: String,
    },

    /// Underlying connect, open-bucket, or flush failure.
    ///
    /// Always wraps the root cause in `cause`.
    #[error("connection error [{code}]: {message}: {cause}")]
    Connection {
        /// Stable machine-readable code (`CONNECT_FAILED`, `FLUSH_FAILED`).
        code: &'static str,
        /// Human-readable description.
        message: String,
        /// The underlying cause.
        cause: String,
    },

    /// Insert attempted on a key that already holds a document.
    #[error("document with key '{0}' already exists")]
    KeyAlreadyExists(String),

    /// Key-based operation found no document.
    ///
    /// Gets and deletes by id normalize this to a `None` result at every
    /// call site; it only surfaces from `replace` (update on absent key).
    #[error("document with key '{0}' was not found")]
    KeyNotFound(String),

    /// Conditional replace was rejected because the document changed since
    /// it was read.
    #[error("document with key '{0}' was modified concurrently")]
    CasMismatch(String),

    /// Query statement execution failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Record serialized to something other than a JSON object.
    ///
    /// Collection-tagged persistence stores every record as a document with
    /// injected fields, which requires an object at the top level.
    #[error("record must serialize to a JSON object, got {0}")]
    InvalidDocument(String),

    /// Record ⇄ wire-document conversion failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for couchkit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shortcut for a [`Error::Config`] value.
    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
        }
    }

    /// Shortcut for a [`Error::InvalidState`] value.
    pub fn invalid_state(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidState {
            code,
            message: message.into(),
        }
    }

    /// Shortcut for a [`Error::Connection`] value wrapping a root cause.
    pub fn connection(
        code: &'static str,
        message: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Connection {
            code,
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns `true` for the soft not-found condition that key-based reads
    /// and deletes normalize to `None`.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("NO_HOST", "connection host is not set");
        assert_eq!(
            err.to_string(),
            "config error [NO_HOST]: connection host is not set"
        );

        let err = Error::connection("CONNECT_FAILED", "connection to cluster failed", "refused");
        assert_eq!(
            err.to_string(),
            "connection error [CONNECT_FAILED]: connection to cluster failed: refused"
        );

        let err = Error::KeyNotFound("dummies1".to_string());
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "document with key 'dummies1' was not found"
        );
    }

    #[test]
    fn test_key_exists_is_not_soft() {
        assert!(!Error::KeyAlreadyExists("k".to_string()).is_not_found());
        assert!(!Error::Query("bad statement".to_string()).is_not_found());
    }
}
