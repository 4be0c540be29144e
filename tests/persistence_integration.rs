//! Integration tests for identity-indexed persistence.

// Tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use couchkit::{
    ConnectionOptions, Error, Identifiable, IdentifiablePersistence, PagingParams, StoreConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Dummy {
    id: String,
    key: String,
    content: String,
}

impl Identifiable for Dummy {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

fn dummy(id: &str, key: &str, content: &str) -> Dummy {
    Dummy {
        id: id.to_string(),
        key: key.to_string(),
        content: content.to_string(),
    }
}

fn config(uri: &str) -> StoreConfig {
    StoreConfig::from_uri(uri, "test").with_options(ConnectionOptions {
        auto_create: true,
        settle_delay_ms: 0,
        ..ConnectionOptions::default()
    })
}

async fn open_persistence(uri: &str, collection: &str) -> IdentifiablePersistence<Dummy> {
    let mut persistence =
        IdentifiablePersistence::new(&config(uri), collection).expect("valid config");
    persistence.open("").await.expect("open");
    persistence
}

#[tokio::test]
async fn test_crud_lifecycle() {
    let persistence = open_persistence("couchbase://it-crud", "dummies").await;

    let dummy1 = persistence
        .create("", dummy("1", "Key 1", "Content 1"))
        .await
        .unwrap();
    assert_eq!(dummy1, dummy("1", "Key 1", "Content 1"));
    persistence
        .create("", dummy("2", "Key 2", "Content 2"))
        .await
        .unwrap();

    let page = persistence
        .get_page_by_filter("", None, &PagingParams::default(), Some("key"))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total, None);

    let updated = persistence
        .update("", dummy("1", "Key 1", "Updated Content 1"))
        .await
        .unwrap();
    assert_eq!(updated.content, "Updated Content 1");

    let patched = persistence
        .update_partially("", "1", &json!({"content": "Partially Updated Content 1"}))
        .await
        .unwrap();
    assert_eq!(patched, dummy("1", "Key 1", "Partially Updated Content 1"));

    let read = persistence.get_one_by_id("", "1").await.unwrap().unwrap();
    assert_eq!(read, patched);

    // A patch can touch neither the identity nor unrelated fields.
    let patched = persistence
        .update_partially("", "1", &json!({"id": "999", "content": "c"}))
        .await
        .unwrap();
    assert_eq!(patched.id, "1");
    assert_eq!(patched.key, "Key 1");
    assert!(persistence.get_one_by_id("", "999").await.unwrap().is_none());

    let deleted = persistence.delete_by_id("", "1").await.unwrap().unwrap();
    assert_eq!(deleted, patched);
    assert!(persistence.get_one_by_id("", "1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_conflict_and_update_missing() {
    let persistence = open_persistence("couchbase://it-conflict", "dummies").await;

    persistence.create("", dummy("1", "k", "c")).await.unwrap();
    let err = persistence
        .create("", dummy("1", "k", "c"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyAlreadyExists(_)));

    let err = persistence
        .update("", dummy("9", "k", "c"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotFound(_)));

    let err = persistence
        .update_partially("", "9", &json!({"content": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotFound(_)));

    // Set works regardless of whether the record exists.
    persistence.set("", dummy("9", "k", "c")).await.unwrap();
    let overwritten = persistence.set("", dummy("9", "k", "c2")).await.unwrap();
    assert_eq!(overwritten.content, "c2");
    let read = persistence.get_one_by_id("", "9").await.unwrap().unwrap();
    assert_eq!(read.content, "c2");
}

#[tokio::test]
async fn test_missing_and_empty_ids_normalize_to_none() {
    let persistence = open_persistence("couchbase://it-normalize", "dummies").await;

    assert!(persistence.get_one_by_id("", "absent").await.unwrap().is_none());
    assert!(persistence.get_one_by_id("", "").await.unwrap().is_none());
    assert!(persistence.delete_by_id("", "absent").await.unwrap().is_none());
    assert!(persistence.delete_by_id("", "").await.unwrap().is_none());
}

#[tokio::test]
async fn test_generated_ids() {
    let persistence = open_persistence("couchbase://it-genid", "dummies").await;

    let created = persistence.create("", dummy("", "k", "c")).await.unwrap();
    assert_eq!(created.id.len(), 16);
    assert!(created.id.chars().all(|c| c.is_ascii_digit()));

    let read = persistence
        .get_one_by_id("", &created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, created);
}

#[tokio::test]
async fn test_get_list_by_ids_omits_missing() {
    let persistence = open_persistence("couchbase://it-bulk-get", "dummies").await;
    persistence.create("", dummy("1", "k1", "c1")).await.unwrap();
    persistence.create("", dummy("3", "k3", "c3")).await.unwrap();

    let ids = vec![
        "1".to_string(),
        "2".to_string(),
        "3".to_string(),
        String::new(),
    ];
    let items = persistence.get_list_by_ids("", &ids).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1");
    assert_eq!(items[1].id, "3");

    assert!(persistence.get_list_by_ids("", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_by_ids_counts_deletions() {
    let persistence = open_persistence("couchbase://it-bulk-delete", "dummies").await;
    for i in 1..=3 {
        persistence
            .create("", dummy(&i.to_string(), "k", "c"))
            .await
            .unwrap();
    }

    let ids = vec![
        "1".to_string(),
        "3".to_string(),
        "missing".to_string(),
        String::new(),
    ];
    let deleted = persistence.delete_by_ids("", &ids).await.unwrap();
    assert_eq!(deleted, 2);

    let remaining = persistence.get_list_by_filter("", None, None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "2");
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let dummies = open_persistence("couchbase://it-isolation", "dummies").await;
    let others = open_persistence("couchbase://it-isolation", "others").await;

    dummies.create("", dummy("1", "k", "d")).await.unwrap();
    others.create("", dummy("1", "k", "o")).await.unwrap();

    // Same id in different collections maps to different documents.
    assert_eq!(
        dummies.get_one_by_id("", "1").await.unwrap().unwrap().content,
        "d"
    );
    assert_eq!(
        others.get_one_by_id("", "1").await.unwrap().unwrap().content,
        "o"
    );

    assert_eq!(dummies.get_count_by_filter("", None).await.unwrap(), 1);
    assert_eq!(others.get_count_by_filter("", None).await.unwrap(), 1);

    dummies.delete_by_filter("", None).await.unwrap();
    assert_eq!(dummies.get_count_by_filter("", None).await.unwrap(), 0);
    assert_eq!(others.get_count_by_filter("", None).await.unwrap(), 1);

    // Clear flushes the whole bucket across collections.
    dummies.clear("").await.unwrap();
    assert_eq!(others.get_count_by_filter("", None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_paging_boundaries() {
    let persistence = open_persistence("couchbase://it-paging", "dummies").await;
    for i in 1..=5 {
        persistence
            .create("", dummy(&i.to_string(), &format!("{i:04}"), "c"))
            .await
            .unwrap();
    }

    let page = persistence
        .get_page_by_filter("", None, &PagingParams::new(2, 2, true), Some("key"))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0].key, "0003");
    assert_eq!(page.total, Some(2));

    // Skip past the end of the result set.
    let page = persistence
        .get_page_by_filter("", None, &PagingParams::new(10, 2, true), Some("key"))
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total, Some(0));
}

#[tokio::test]
async fn test_filter_and_random_are_collection_scoped() {
    let dummies = open_persistence("couchbase://it-scoped", "dummies").await;
    let others = open_persistence("couchbase://it-scoped", "others").await;
    dummies.create("", dummy("1", "match", "c")).await.unwrap();
    others.create("", dummy("2", "match", "c")).await.unwrap();

    let items = dummies
        .get_list_by_filter("", Some("key='match'"), None)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "1");

    let random = dummies.get_one_random("", None).await.unwrap().unwrap();
    assert_eq!(random.id, "1");
    assert!(
        dummies
            .get_one_random("", Some("key='nope'"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_map_shaped_records() {
    let mut persistence =
        IdentifiablePersistence::<Value>::new(&config("couchbase://it-maps"), "dummies")
            .expect("valid config");
    persistence.open("").await.unwrap();

    let created = persistence
        .create("", json!({"id": "1", "key": "k", "content": {"nested": true}}))
        .await
        .unwrap();
    assert_eq!(created["content"]["nested"], true);

    let read = persistence.get_one_by_id("", "1").await.unwrap().unwrap();
    assert_eq!(read, created);
    assert!(read.get("_c").is_none());

    let patched = persistence
        .update_partially("", "1", &json!({"key": "k2"}))
        .await
        .unwrap();
    assert_eq!(patched["key"], "k2");
    assert_eq!(patched["content"]["nested"], true);
}
