//! Filtered-query persistence for arbitrary records.

use crate::client::{Bucket, ClusterConnector};
use crate::config::StoreConfig;
use crate::connect::ClusterConnection;
use crate::id::IdGenerator;
use crate::persistence::{ConnectionHandle, Page, PagingParams, Record, from_document, to_document};
use crate::query::{self, QueryConsistency};
use crate::{Error, Result};
use rand::Rng;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Persistence over one bucket with filtered queries, paging, random
/// sampling, and bulk delete.
///
/// Records have no identity here; `create` stores each record under a fresh
/// generated key. Identity-indexed CRUD lives in
/// [`IdentifiablePersistence`](super::IdentifiablePersistence).
///
/// Filter, sort, and selection fragments are passed through to the query
/// builder verbatim and must come from code, not from untrusted input.
pub struct GenericPersistence<T> {
    connection: ConnectionHandle,
    bucket: Option<Arc<dyn Bucket>>,
    bucket_name: String,
    max_page_size: u64,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> GenericPersistence<T> {
    /// Persistence with an owned connection over the default in-memory
    /// connector.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self::from_handle(config, ConnectionHandle::Owned(ClusterConnection::new(config)))
    }

    /// Persistence with an owned connection over an explicit connector.
    #[must_use]
    pub fn with_connector(config: &StoreConfig, connector: Arc<dyn ClusterConnector>) -> Self {
        Self::from_handle(
            config,
            ConnectionHandle::Owned(ClusterConnection::with_connector(config, connector)),
        )
    }

    /// Persistence borrowing a shared connection managed by its owner.
    ///
    /// Opening this component does not open the shared connection; it must
    /// be opened by whoever owns it.
    #[must_use]
    pub fn with_shared_connection(config: &StoreConfig, connection: Arc<ClusterConnection>) -> Self {
        Self::from_handle(config, ConnectionHandle::Shared(connection))
    }

    fn from_handle(config: &StoreConfig, connection: ConnectionHandle) -> Self {
        Self {
            connection,
            bucket: None,
            bucket_name: config.bucket.clone().unwrap_or_default(),
            max_page_size: config.max_page_size,
            _record: PhantomData,
        }
    }

    /// Returns `true` if the component has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.bucket.is_some()
    }

    /// The physical bucket name.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// The connection this component works through.
    #[must_use]
    pub fn connection(&self) -> &ClusterConnection {
        self.connection.connection()
    }

    /// Opens the component. An owned connection is opened along with it; a
    /// shared connection must already be open or the call fails with
    /// `ConnectionError("CONNECT_FAILED")`.
    pub async fn open(&mut self, trace_id: &str) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        if self.connection.is_owned() {
            self.connection.connection().open(trace_id).await?;
        }
        let connection = self.connection.connection();
        if !connection.is_open() {
            return Err(Error::connection(
                "CONNECT_FAILED",
                "cluster connection is not opened",
                "the connection owner has not opened it",
            ));
        }
        self.bucket_name = connection.bucket_name().to_string();
        self.bucket = connection.bucket();
        Ok(())
    }

    /// Closes the component and, for an owned connection, the connection
    /// too. Idempotent.
    pub fn close(&mut self, trace_id: &str) {
        if self.connection.is_owned() {
            self.connection.connection().close(trace_id);
        }
        self.bucket = None;
    }

    /// Removes all documents from the bucket.
    pub async fn clear(&self, trace_id: &str) -> Result<()> {
        self.connection.connection().clear(trace_id).await
    }

    pub(crate) fn bucket(&self) -> Result<&Arc<dyn Bucket>> {
        self.bucket.as_ref().ok_or_else(|| {
            Error::invalid_state("NOT_OPENED", "persistence component is not opened")
        })
    }

    /// Stores a record under a fresh generated key and returns it.
    pub async fn create(&self, trace_id: &str, item: T) -> Result<T> {
        let key = IdGenerator::next_long();
        let document = to_document(&item)?;
        self.bucket()?.insert(&key, document).await?;
        debug!(trace_id, key, "created document");
        Ok(item)
    }

    /// Retrieves one page of records matching a filter.
    ///
    /// `take` defaults to the configured maximum page size. The page total
    /// is populated only when requested and counts this page.
    pub async fn get_page_by_filter(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        paging: &PagingParams,
        sort: Option<&str>,
        selection: Option<&str>,
    ) -> Result<Page<T>> {
        let rows = self
            .page_rows(trace_id, filter, paging, sort, selection)
            .await?;
        let data = rows
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<T>>>()?;
        let total = paging.total.then(|| data.len() as u64);
        Ok(Page { data, total })
    }

    /// Retrieves all records matching a filter.
    pub async fn get_list_by_filter(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        sort: Option<&str>,
        selection: Option<&str>,
    ) -> Result<Vec<T>> {
        let rows = self.list_rows(trace_id, filter, sort, selection).await?;
        rows.into_iter().map(from_document).collect()
    }

    /// Counts records matching a filter.
    pub async fn get_count_by_filter(&self, trace_id: &str, filter: Option<&str>) -> Result<u64> {
        let statement = query::build_count(&self.bucket_name, filter);
        let rows = self
            .bucket()?
            .query(&statement, QueryConsistency::StatementPlus)
            .await?;
        let count = Self::scalar_result(&rows);
        debug!(trace_id, count, "counted documents");
        Ok(count)
    }

    /// Retrieves one record picked uniformly at random among those matching
    /// a filter, or `None` when nothing matches.
    pub async fn get_one_random(&self, trace_id: &str, filter: Option<&str>) -> Result<Option<T>> {
        let row = self.random_row(trace_id, filter).await?;
        row.map(from_document).transpose()
    }

    /// Deletes all records matching a filter.
    pub async fn delete_by_filter(&self, trace_id: &str, filter: Option<&str>) -> Result<()> {
        let statement = query::build_delete(&self.bucket_name, filter);
        let rows = self
            .bucket()?
            .query(&statement, QueryConsistency::NotBounded)
            .await?;
        debug!(trace_id, count = Self::scalar_result(&rows), "deleted documents");
        Ok(())
    }

    pub(crate) async fn page_rows(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        paging: &PagingParams,
        sort: Option<&str>,
        selection: Option<&str>,
    ) -> Result<Vec<Value>> {
        let take = paging.take.unwrap_or(self.max_page_size);
        let statement = query::build_select(
            &self.bucket_name,
            selection,
            filter,
            sort,
            paging.skip,
            Some(take),
        );
        let rows = self
            .bucket()?
            .query(&statement, QueryConsistency::StatementPlus)
            .await?;
        debug!(trace_id, count = rows.len(), "retrieved page of documents");
        Ok(rows)
    }

    pub(crate) async fn list_rows(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        sort: Option<&str>,
        selection: Option<&str>,
    ) -> Result<Vec<Value>> {
        let statement =
            query::build_select(&self.bucket_name, selection, filter, sort, None, None);
        let rows = self
            .bucket()?
            .query(&statement, QueryConsistency::RequestPlus)
            .await?;
        debug!(trace_id, count = rows.len(), "retrieved list of documents");
        Ok(rows)
    }

    pub(crate) async fn random_row(
        &self,
        trace_id: &str,
        filter: Option<&str>,
    ) -> Result<Option<Value>> {
        let count = self.get_count_by_filter(trace_id, filter).await?;
        if count == 0 {
            return Ok(None);
        }
        // The RNG handle is not Send; scope it away from the await below.
        let skip = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..count)
        };
        let statement =
            query::build_select(&self.bucket_name, None, filter, None, Some(skip), Some(1));
        let rows = self
            .bucket()?
            .query(&statement, QueryConsistency::RequestPlus)
            .await?;
        debug!(trace_id, "retrieved random document");
        Ok(rows.into_iter().next())
    }

    /// Single scalar reported by COUNT and DELETE statements.
    fn scalar_result(rows: &[Value]) -> u64 {
        rows.first()
            .and_then(|row| row.get("$1"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

impl<T> std::fmt::Debug for GenericPersistence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericPersistence")
            .field("bucket_name", &self.bucket_name)
            .field("open", &self.bucket.is_some())
            .finish_non_exhaustive()
    }
}
