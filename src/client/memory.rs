//! In-memory cluster and bucket backend.
//!
//! Implements the store client seam entirely in process. Clusters are
//! registered per connection URI, so two components resolving the same URI
//! share one cluster and see each other's writes, mirroring how a real
//! deployment behaves. The bucket ships a small statement evaluator that
//! covers exactly the grammar produced by [`crate::query`].

use crate::client::{Bucket, BucketSettings, Cas, ClusterClient, ClusterConnector};
use crate::query::QueryConsistency;
use crate::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Process-wide cluster registry keyed by connection URI.
static CLUSTERS: Lazy<Mutex<HashMap<String, Arc<MemoryCluster>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Connector that resolves URIs against the process-wide registry.
///
/// Connecting to a URI for the first time creates an empty cluster;
/// subsequent connects to the same URI return the same cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryConnector;

#[async_trait]
impl ClusterConnector for MemoryConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn ClusterClient>> {
        let mut clusters = CLUSTERS.lock();
        let cluster = clusters
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(MemoryCluster::new()))
            .clone();
        Ok(cluster)
    }
}

/// In-memory cluster holding named buckets.
pub struct MemoryCluster {
    buckets: RwLock<HashMap<String, Arc<MemoryBucket>>>,
    credentials: RwLock<Option<(String, String)>>,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            credentials: RwLock::new(None),
        }
    }

    /// Returns the credentials captured by the last `authenticate` call.
    #[must_use]
    pub fn authenticated_as(&self) -> Option<(String, String)> {
        self.credentials.read().clone()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        *self.credentials.write() = Some((username.to_string(), password.to_string()));
        Ok(())
    }

    async fn create_bucket(&self, settings: BucketSettings) -> Result<()> {
        let mut buckets = self.buckets.write();
        if buckets.contains_key(&settings.name) {
            return Err(Error::KeyAlreadyExists(settings.name));
        }
        let name = settings.name.clone();
        buckets.insert(name, Arc::new(MemoryBucket::new(settings)));
        Ok(())
    }

    async fn open_bucket(&self, name: &str) -> Result<Arc<dyn Bucket>> {
        let buckets = self.buckets.read();
        buckets.get(name).map_or_else(
            || Err(Error::KeyNotFound(name.to_string())),
            |bucket| Ok(bucket.clone() as Arc<dyn Bucket>),
        )
    }

    async fn create_primary_index(&self, bucket: &str) -> Result<()> {
        let buckets = self.buckets.read();
        let bucket = buckets
            .get(bucket)
            .ok_or_else(|| Error::KeyNotFound(bucket.to_string()))?;
        bucket.indexed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn flush_bucket(&self, bucket: &str) -> Result<()> {
        let buckets = self.buckets.read();
        let bucket = buckets
            .get(bucket)
            .ok_or_else(|| Error::KeyNotFound(bucket.to_string()))?;
        if !bucket.flush_enabled {
            return Err(Error::invalid_state(
                "FLUSH_DISABLED",
                format!("flush is not enabled on bucket '{}'", bucket.name),
            ));
        }
        bucket.documents.write().clear();
        Ok(())
    }
}

struct StoredDocument {
    value: Value,
    cas: Cas,
}

/// In-memory bucket with a minimal statement evaluator.
pub struct MemoryBucket {
    name: String,
    flush_enabled: bool,
    indexed: AtomicBool,
    next_cas: AtomicU64,
    documents: RwLock<BTreeMap<String, StoredDocument>>,
}

impl MemoryBucket {
    fn new(settings: BucketSettings) -> Self {
        Self {
            name: settings.name,
            flush_enabled: settings.flush_enabled,
            indexed: AtomicBool::new(false),
            next_cas: AtomicU64::new(1),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    fn bump_cas(&self) -> Cas {
        self.next_cas.fetch_add(1, Ordering::SeqCst)
    }

    fn require_index(&self) -> Result<()> {
        if self.indexed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Query(format!(
                "no primary index on bucket '{}'",
                self.name
            )))
        }
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, key: &str, document: Value) -> Result<Cas> {
        let mut documents = self.documents.write();
        if documents.contains_key(key) {
            return Err(Error::KeyAlreadyExists(key.to_string()));
        }
        let cas = self.bump_cas();
        documents.insert(key.to_string(), StoredDocument { value: document, cas });
        Ok(cas)
    }

    async fn upsert(&self, key: &str, document: Value) -> Result<Cas> {
        let mut documents = self.documents.write();
        let cas = self.bump_cas();
        documents.insert(key.to_string(), StoredDocument { value: document, cas });
        Ok(cas)
    }

    async fn replace(&self, key: &str, document: Value, cas: Cas) -> Result<Cas> {
        let mut documents = self.documents.write();
        let Some(existing) = documents.get_mut(key) else {
            return Err(Error::KeyNotFound(key.to_string()));
        };
        if cas != 0 && cas != existing.cas {
            return Err(Error::CasMismatch(key.to_string()));
        }
        let next = self.next_cas.fetch_add(1, Ordering::SeqCst);
        existing.value = document;
        existing.cas = next;
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<(Value, Cas)> {
        let documents = self.documents.read();
        documents.get(key).map_or_else(
            || Err(Error::KeyNotFound(key.to_string())),
            |stored| Ok((stored.value.clone(), stored.cas)),
        )
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Result<(Value, Cas)>>> {
        let documents = self.documents.read();
        Ok(keys
            .iter()
            .map(|key| {
                documents.get(key).map_or_else(
                    || Err(Error::KeyNotFound(key.clone())),
                    |stored| Ok((stored.value.clone(), stored.cas)),
                )
            })
            .collect())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut documents = self.documents.write();
        if documents.remove(key).is_none() {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        Ok(())
    }

    // The memory store is always consistent, so the requested scan
    // consistency has no effect here.
    async fn query(&self, statement: &str, _consistency: QueryConsistency) -> Result<Vec<Value>> {
        self.require_index()?;
        let parsed = Statement::parse(statement, &self.name)?;
        match parsed {
            Statement::Count { condition } => {
                let documents = self.documents.read();
                let count = documents
                    .values()
                    .filter(|stored| condition_matches(condition.as_ref(), &stored.value))
                    .count();
                Ok(vec![json!({ "$1": count })])
            }
            Statement::Select {
                selection,
                condition,
                order,
                offset,
                limit,
            } => {
                let documents = self.documents.read();
                let mut rows: Vec<Value> = documents
                    .values()
                    .filter(|stored| condition_matches(condition.as_ref(), &stored.value))
                    .map(|stored| stored.value.clone())
                    .collect();
                drop(documents);
                if let Some(order) = &order {
                    sort_rows(&mut rows, order);
                }
                let rows = rows
                    .into_iter()
                    .skip(offset.unwrap_or(0))
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|row| project(&selection, row))
                    .collect();
                Ok(rows)
            }
            Statement::Delete { condition } => {
                let mut documents = self.documents.write();
                let doomed: Vec<String> = documents
                    .iter()
                    .filter(|(_, stored)| condition_matches(condition.as_ref(), &stored.value))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &doomed {
                    documents.remove(key);
                }
                Ok(vec![json!({ "$1": doomed.len() })])
            }
        }
    }
}

/// Sort order parsed from an `ORDER BY` clause.
struct SortOrder {
    field: String,
    ascending: bool,
}

/// One `field='value'` (or `field=number`) equality term.
struct Term {
    field: String,
    value: Value,
}

enum Statement {
    Select {
        selection: Vec<String>,
        condition: Option<Vec<Term>>,
        order: Option<SortOrder>,
        offset: Option<usize>,
        limit: Option<usize>,
    },
    Count {
        condition: Option<Vec<Term>>,
    },
    Delete {
        condition: Option<Vec<Term>>,
    },
}

impl Statement {
    /// Parses a statement emitted by [`crate::query`].
    ///
    /// The grammar is intentionally narrow: equality terms joined by `AND`,
    /// one `ORDER BY` field, literal `OFFSET`/`LIMIT` values.
    fn parse(statement: &str, bucket: &str) -> Result<Self> {
        let from_clause = format!("FROM `{bucket}`");

        if let Some(rest) = statement.strip_prefix("DELETE ") {
            let tail = strip_from(rest, &from_clause, statement)?;
            let condition = parse_where(tail, statement)?;
            return Ok(Self::Delete { condition });
        }

        let Some(rest) = statement.strip_prefix("SELECT ") else {
            return Err(unsupported(statement));
        };

        let Some((selection, tail)) = rest.split_once(&from_clause) else {
            return Err(unsupported(statement));
        };
        let selection = selection.trim();
        // The tail keeps its leading space: the clause markers below are
        // matched space-prefixed to avoid false hits inside values.

        if selection == "COUNT(*)" {
            let condition = parse_where(tail, statement)?;
            return Ok(Self::Count { condition });
        }

        let (tail, limit) = take_numeric_suffix(tail, " LIMIT ")?;
        let (tail, offset) = take_numeric_suffix(tail, " OFFSET ")?;
        let (tail, order) = take_order_suffix(tail);
        let condition = parse_where(tail.trim(), statement)?;

        let selection = if selection == "*" {
            Vec::new()
        } else {
            selection.split(',').map(|s| s.trim().to_string()).collect()
        };

        Ok(Self::Select {
            selection,
            condition,
            order,
            offset,
            limit,
        })
    }
}

fn unsupported(statement: &str) -> Error {
    Error::Query(format!("unsupported statement: {statement}"))
}

fn strip_from<'a>(rest: &'a str, from_clause: &str, statement: &str) -> Result<&'a str> {
    rest.strip_prefix(from_clause)
        .map(str::trim_start)
        .ok_or_else(|| unsupported(statement))
}

/// Splits a trailing ` MARKER <number>` clause off `tail`, if present.
fn take_numeric_suffix<'a>(tail: &'a str, marker: &str) -> Result<(&'a str, Option<usize>)> {
    match tail.rfind(marker) {
        Some(at) => {
            let value = tail[at + marker.len()..].trim();
            let parsed = value
                .parse::<usize>()
                .map_err(|_| Error::Query(format!("invalid{marker}value: {value}")))?;
            Ok((&tail[..at], Some(parsed)))
        }
        None => Ok((tail, None)),
    }
}

fn take_order_suffix(tail: &str) -> (&str, Option<SortOrder>) {
    let marker = " ORDER BY ";
    let Some(at) = tail.rfind(marker) else {
        return (tail, None);
    };
    let clause = tail[at + marker.len()..].trim();
    let (field, ascending) = match clause.strip_suffix(" DESC") {
        Some(field) => (field, false),
        None => (clause.strip_suffix(" ASC").unwrap_or(clause), true),
    };
    (
        &tail[..at],
        Some(SortOrder {
            field: field.trim().to_string(),
            ascending,
        }),
    )
}

fn parse_where(tail: &str, statement: &str) -> Result<Option<Vec<Term>>> {
    let tail = tail.trim();
    if tail.is_empty() {
        return Ok(None);
    }
    let Some(condition) = tail.strip_prefix("WHERE ") else {
        return Err(unsupported(statement));
    };
    let terms = condition
        .split(" AND ")
        .map(parse_term)
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(terms))
}

fn parse_term(term: &str) -> Result<Term> {
    let Some((field, raw)) = term.split_once('=') else {
        return Err(Error::Query(format!("unsupported filter term: {term}")));
    };
    let field = field.trim().to_string();
    let raw = raw.trim();
    let value = if let Some(quoted) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        Value::String(quoted.to_string())
    } else if let Ok(number) = raw.parse::<i64>() {
        json!(number)
    } else if let Ok(number) = raw.parse::<f64>() {
        json!(number)
    } else {
        return Err(Error::Query(format!("unsupported filter value: {raw}")));
    };
    Ok(Term { field, value })
}

fn condition_matches(condition: Option<&Vec<Term>>, document: &Value) -> bool {
    let Some(terms) = condition else {
        return true;
    };
    terms.iter().all(|term| {
        document
            .get(&term.field)
            .is_some_and(|actual| values_equal(actual, &term.value))
    })
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => actual == expected,
    }
}

fn sort_rows(rows: &mut [Value], order: &SortOrder) {
    rows.sort_by(|a, b| {
        let a = a.get(&order.field);
        let b = b.get(&order.field);
        let ordering = compare_values(a, b);
        if order.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => a
                .as_str()
                .unwrap_or_default()
                .cmp(b.as_str().unwrap_or_default()),
        },
    }
}

fn project(selection: &[String], row: Value) -> Value {
    if selection.is_empty() {
        return row;
    }
    let mut projected = Map::new();
    for field in selection {
        if let Some(value) = row.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    Value::Object(projected)
}
