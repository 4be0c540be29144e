//! Cluster connection lifecycle.

use crate::client::{BucketSettings, ClusterClient, ClusterConnector, MemoryConnector};
use crate::config::{ConnectionOptions, StoreConfig};
use crate::connect::ConnectionResolver;
use crate::{Bucket, Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Handles captured while the connection is open.
struct OpenState {
    cluster: Arc<dyn ClusterClient>,
    bucket: Arc<dyn Bucket>,
}

/// Owns the lifecycle of one connection to the store cluster and one
/// opened bucket.
///
/// `open` walks the state machine resolving → connecting → authenticating
/// → \[creating bucket\] → opening bucket → \[creating index\]; any failure
/// leaves the connection closed. `close` is idempotent. Lifecycle
/// transitions must not be invoked concurrently with each other; CRUD
/// traffic through the exposed handles is unrestricted.
pub struct ClusterConnection {
    resolver: ConnectionResolver,
    options: ConnectionOptions,
    bucket_name: String,
    connector: Arc<dyn ClusterConnector>,
    state: RwLock<Option<OpenState>>,
}

impl ClusterConnection {
    /// Connection over the default in-memory connector.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_connector(config, Arc::new(MemoryConnector))
    }

    /// Connection over an explicit cluster connector.
    #[must_use]
    pub fn with_connector(config: &StoreConfig, connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            resolver: ConnectionResolver::new(
                config.connections.clone(),
                config.credential.clone(),
            ),
            options: config.options.clone(),
            bucket_name: config.bucket.clone().unwrap_or_default(),
            connector,
            state: RwLock::new(None),
        }
    }

    /// Returns `true` if the connection has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.read().is_some()
    }

    /// The configured bucket name.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// The cluster handle, while open.
    #[must_use]
    pub fn cluster(&self) -> Option<Arc<dyn ClusterClient>> {
        self.state.read().as_ref().map(|state| state.cluster.clone())
    }

    /// The bucket handle, while open.
    #[must_use]
    pub fn bucket(&self) -> Option<Arc<dyn Bucket>> {
        self.state.read().as_ref().map(|state| state.bucket.clone())
    }

    /// Opens the connection. Succeeds immediately if already open.
    ///
    /// Resolution and connect errors propagate unmodified; an open-bucket
    /// failure is wrapped as `ConnectionError("CONNECT_FAILED")`. On any
    /// failure the connection remains closed.
    pub async fn open(&self, trace_id: &str) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let params = match self.resolver.resolve(trace_id).await {
            Ok(params) => params,
            Err(err) => {
                error!(trace_id, "failed to resolve cluster connection: {err}");
                return Err(err);
            }
        };

        debug!(trace_id, uri = %params.uri, "connecting to cluster");
        let cluster = self.connector.connect(&params.uri).await?;

        if params.has_credentials() {
            cluster
                .authenticate(&params.username, &params.password)
                .await?;
        }

        let mut new_bucket = false;
        if self.options.auto_create {
            match cluster.create_bucket(self.bucket_settings()).await {
                Ok(()) => new_bucket = true,
                // Racing against another creator is fine.
                Err(Error::KeyAlreadyExists(_)) => {}
                Err(err) => return Err(err),
            }
            // The store needs time to materialize a freshly created bucket
            // before it can be opened; a lost creation race settles too.
            tokio::time::sleep(Duration::from_millis(self.options.settle_delay_ms)).await;
        }

        let bucket = match cluster.open_bucket(&self.bucket_name).await {
            Ok(bucket) => bucket,
            Err(err) => {
                error!(trace_id, bucket = %self.bucket_name, "failed to open bucket: {err}");
                return Err(Error::connection(
                    "CONNECT_FAILED",
                    "connection to the store failed",
                    err,
                ));
            }
        };

        if new_bucket || self.options.auto_index {
            cluster.create_primary_index(&self.bucket_name).await?;
        }

        debug!(trace_id, bucket = %self.bucket_name, "connected to bucket");
        *self.state.write() = Some(OpenState { cluster, bucket });
        Ok(())
    }

    /// Closes the connection and releases the handles. Idempotent.
    pub fn close(&self, trace_id: &str) {
        *self.state.write() = None;
        debug!(trace_id, bucket = %self.bucket_name, "disconnected from bucket");
    }

    /// Flushes all documents from the bucket.
    ///
    /// Requires a configured bucket name and an open connection; flush must
    /// be enabled on the bucket. Failures are wrapped as
    /// `ConnectionError("FLUSH_FAILED")`.
    pub async fn clear(&self, trace_id: &str) -> Result<()> {
        if self.bucket_name.is_empty() {
            return Err(Error::config("NO_BUCKET", "bucket name is not defined"));
        }
        let cluster = self.cluster().ok_or_else(|| {
            Error::invalid_state("NOT_OPENED", "cluster connection is not opened")
        })?;
        if let Err(err) = cluster.flush_bucket(&self.bucket_name).await {
            error!(trace_id, bucket = %self.bucket_name, "bucket flush failed: {err}");
            return Err(Error::connection("FLUSH_FAILED", "bucket flush failed", err));
        }
        debug!(trace_id, bucket = %self.bucket_name, "flushed bucket");
        Ok(())
    }

    fn bucket_settings(&self) -> BucketSettings {
        BucketSettings {
            name: self.bucket_name.clone(),
            kind: self.options.bucket_type,
            ram_quota_mb: self.options.ram_quota,
            flush_enabled: self.options.flush_enabled,
        }
    }
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("bucket_name", &self.bucket_name)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
