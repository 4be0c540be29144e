//! Identity-indexed persistence with logical collections.

use crate::client::ClusterConnector;
use crate::config::StoreConfig;
use crate::connect::ClusterConnection;
use crate::id::IdGenerator;
use crate::persistence::{
    GenericPersistence, Identifiable, Page, PagingParams, from_document, json_kind, to_document,
};
use crate::query::{self, COLLECTION_TAG};
use crate::{Error, Result};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Identity-indexed persistence multiplexing one logical collection inside
/// a physical bucket.
///
/// Every stored document carries a collection tag field, injected on write
/// and stripped on read, and lives under the key `{collection}{id}`. All
/// filtered operations are scoped to the collection, so several components
/// with different collection names can share one bucket without seeing each
/// other's records.
///
/// Key-based reads and deletes normalize "not found" to `None`; only
/// `update` and `update_partially` surface [`Error::KeyNotFound`].
pub struct IdentifiablePersistence<T> {
    base: GenericPersistence<T>,
    collection: String,
}

impl<T: Identifiable> IdentifiablePersistence<T> {
    /// Persistence with an owned connection over the default in-memory
    /// connector.
    ///
    /// Fails with a `Config` error when the bucket or collection name is
    /// empty.
    pub fn new(config: &StoreConfig, collection: impl Into<String>) -> Result<Self> {
        Self::from_base(GenericPersistence::new(config), collection.into())
    }

    /// Persistence with an owned connection over an explicit connector.
    pub fn with_connector(
        config: &StoreConfig,
        collection: impl Into<String>,
        connector: Arc<dyn ClusterConnector>,
    ) -> Result<Self> {
        Self::from_base(
            GenericPersistence::with_connector(config, connector),
            collection.into(),
        )
    }

    /// Persistence borrowing a shared connection managed by its owner.
    pub fn with_shared_connection(
        config: &StoreConfig,
        collection: impl Into<String>,
        connection: Arc<ClusterConnection>,
    ) -> Result<Self> {
        Self::from_base(
            GenericPersistence::with_shared_connection(config, connection),
            collection.into(),
        )
    }

    fn from_base(base: GenericPersistence<T>, collection: String) -> Result<Self> {
        if base.bucket_name().is_empty() {
            return Err(Error::config("NO_BUCKET", "bucket name is not set"));
        }
        if collection.is_empty() {
            return Err(Error::config("NO_COLLECTION", "collection name is not set"));
        }
        Ok(Self { base, collection })
    }

    /// The logical collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns `true` if the component has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.base.is_open()
    }

    /// Opens the component, see [`GenericPersistence::open`].
    pub async fn open(&mut self, trace_id: &str) -> Result<()> {
        self.base.open(trace_id).await
    }

    /// Closes the component, see [`GenericPersistence::close`].
    pub fn close(&mut self, trace_id: &str) {
        self.base.close(trace_id);
    }

    /// Removes all documents from the bucket, including other collections.
    pub async fn clear(&self, trace_id: &str) -> Result<()> {
        self.base.clear(trace_id).await
    }

    /// Physical bucket key for a record id. Empty id maps to an empty key.
    #[must_use]
    pub fn bucket_key(&self, id: &str) -> String {
        if id.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.collection, id)
        }
    }

    /// Stores a new record; fails with [`Error::KeyAlreadyExists`] when the
    /// id is taken. A record without an id gets a generated one.
    pub async fn create(&self, trace_id: &str, mut item: T) -> Result<T> {
        if item.id().is_empty() {
            item.set_id(IdGenerator::next_long());
        }
        let key = self.bucket_key(&item.id());
        let document = self.tag(&item)?;
        self.base.bucket()?.insert(&key, document).await?;
        debug!(trace_id, key, "created document");
        Ok(item)
    }

    /// Stores a record, overwriting any previous one with the same id. A
    /// record without an id gets a generated one.
    pub async fn set(&self, trace_id: &str, mut item: T) -> Result<T> {
        if item.id().is_empty() {
            item.set_id(IdGenerator::next_long());
        }
        let key = self.bucket_key(&item.id());
        let document = self.tag(&item)?;
        self.base.bucket()?.upsert(&key, document).await?;
        debug!(trace_id, key, "set document");
        Ok(item)
    }

    /// Replaces an existing record; fails with [`Error::KeyNotFound`] when
    /// no record with that id exists.
    pub async fn update(&self, trace_id: &str, item: T) -> Result<T> {
        let key = self.bucket_key(&item.id());
        let document = self.tag(&item)?;
        self.base.bucket()?.replace(&key, document, 0).await?;
        debug!(trace_id, key, "updated document");
        Ok(item)
    }

    /// Merges the fields of a JSON object into an existing record and
    /// returns the updated record.
    ///
    /// The merge is conditional on the document not changing between read
    /// and write; a lost race surfaces as [`Error::CasMismatch`]. A missing
    /// record surfaces as [`Error::KeyNotFound`].
    pub async fn update_partially(
        &self,
        trace_id: &str,
        id: &str,
        update: &Value,
    ) -> Result<T> {
        let Value::Object(fields) = update else {
            return Err(Error::InvalidDocument(json_kind(update).to_string()));
        };
        let key = self.bucket_key(id);
        let bucket = self.base.bucket()?;

        let (mut document, cas) = bucket.get(&key).await?;
        let Value::Object(map) = &mut document else {
            return Err(Error::InvalidDocument(json_kind(&document).to_string()));
        };
        for (field, value) in fields {
            map.insert(field.clone(), value.clone());
        }
        // The tag and id are not updatable.
        map.insert(
            COLLECTION_TAG.to_string(),
            Value::String(self.collection.clone()),
        );
        map.insert("id".to_string(), Value::String(id.to_string()));

        bucket.replace(&key, document.clone(), cas).await?;
        debug!(trace_id, key, "partially updated document");
        Self::convert(document)
    }

    /// Retrieves a record by id, or `None` when absent or the id is empty.
    pub async fn get_one_by_id(&self, trace_id: &str, id: &str) -> Result<Option<T>> {
        let key = self.bucket_key(id);
        if key.is_empty() {
            return Ok(None);
        }
        match self.base.bucket()?.get(&key).await {
            Ok((document, _)) => {
                debug!(trace_id, key, "retrieved document");
                Ok(Some(Self::convert(document)?))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Retrieves records for a list of ids in one round trip.
    ///
    /// Missing ids are silently omitted; the result preserves the order of
    /// the ids that were found. Empty ids are skipped.
    pub async fn get_list_by_ids(&self, trace_id: &str, ids: &[String]) -> Result<Vec<T>> {
        let keys: Vec<String> = ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| self.bucket_key(id))
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.base.bucket()?.get_many(&keys).await?;
        let mut items = Vec::with_capacity(results.len());
        for result in results {
            if let Ok((document, _)) = result {
                items.push(Self::convert(document)?);
            }
        }
        debug!(trace_id, count = items.len(), "retrieved documents by ids");
        Ok(items)
    }

    /// Deletes a record by id and returns it, or `None` when absent or the
    /// id is empty.
    pub async fn delete_by_id(&self, trace_id: &str, id: &str) -> Result<Option<T>> {
        let key = self.bucket_key(id);
        if key.is_empty() {
            return Ok(None);
        }
        let bucket = self.base.bucket()?;
        let old = match bucket.get(&key).await {
            Ok((document, _)) => Self::convert(document)?,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        match bucket.remove(&key).await {
            Ok(()) => {}
            // Lost a race against another deleter.
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        }
        debug!(trace_id, key, "deleted document");
        Ok(Some(old))
    }

    /// Deletes records for a list of ids concurrently and returns how many
    /// were deleted.
    ///
    /// Missing ids do not count and are not errors. All deletions are
    /// attempted even when some fail; the first hard failure is returned
    /// after the fan-out completes.
    pub async fn delete_by_ids(&self, trace_id: &str, ids: &[String]) -> Result<u64> {
        let bucket = self.base.bucket()?;
        let keys: Vec<String> = ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| self.bucket_key(id))
            .collect();

        let outcomes = join_all(keys.iter().map(|key| bucket.remove(key))).await;
        let mut deleted = 0u64;
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(()) => deleted += 1,
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        debug!(trace_id, deleted, "deleted documents by ids");
        match first_error {
            Some(err) => Err(err),
            None => Ok(deleted),
        }
    }

    /// Retrieves one page of this collection's records matching a filter.
    pub async fn get_page_by_filter(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        paging: &PagingParams,
        sort: Option<&str>,
    ) -> Result<Page<T>> {
        let scoped = query::scope_filter(&self.collection, filter);
        let rows = self
            .base
            .page_rows(trace_id, Some(&scoped), paging, sort, None)
            .await?;
        let data = rows
            .into_iter()
            .map(Self::convert)
            .collect::<Result<Vec<T>>>()?;
        let total = paging.total.then(|| data.len() as u64);
        Ok(Page { data, total })
    }

    /// Retrieves all of this collection's records matching a filter.
    pub async fn get_list_by_filter(
        &self,
        trace_id: &str,
        filter: Option<&str>,
        sort: Option<&str>,
    ) -> Result<Vec<T>> {
        let scoped = query::scope_filter(&self.collection, filter);
        let rows = self
            .base
            .list_rows(trace_id, Some(&scoped), sort, None)
            .await?;
        rows.into_iter().map(Self::convert).collect()
    }

    /// Counts this collection's records matching a filter.
    pub async fn get_count_by_filter(&self, trace_id: &str, filter: Option<&str>) -> Result<u64> {
        let scoped = query::scope_filter(&self.collection, filter);
        self.base.get_count_by_filter(trace_id, Some(&scoped)).await
    }

    /// Retrieves one of this collection's records picked uniformly at
    /// random among those matching a filter.
    pub async fn get_one_random(&self, trace_id: &str, filter: Option<&str>) -> Result<Option<T>> {
        let scoped = query::scope_filter(&self.collection, filter);
        let row = self.base.random_row(trace_id, Some(&scoped)).await?;
        row.map(Self::convert).transpose()
    }

    /// Deletes this collection's records matching a filter.
    pub async fn delete_by_filter(&self, trace_id: &str, filter: Option<&str>) -> Result<()> {
        let scoped = query::scope_filter(&self.collection, filter);
        self.base.delete_by_filter(trace_id, Some(&scoped)).await
    }

    /// Serializes a record and injects the collection tag.
    fn tag(&self, item: &T) -> Result<Value> {
        let mut document = to_document(item)?;
        let Value::Object(map) = &mut document else {
            return Err(Error::InvalidDocument(json_kind(&document).to_string()));
        };
        map.insert(
            COLLECTION_TAG.to_string(),
            Value::String(self.collection.clone()),
        );
        Ok(document)
    }

    /// Strips the collection tag and deserializes a record.
    fn convert(mut document: Value) -> Result<T> {
        if let Value::Object(map) = &mut document {
            map.remove(COLLECTION_TAG);
        }
        from_document(document)
    }
}

impl<T: Identifiable> std::fmt::Debug for IdentifiablePersistence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifiablePersistence")
            .field("bucket_name", &self.base.bucket_name())
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}
