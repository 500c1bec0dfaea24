//! In-memory [`DocumentStore`] implementation backed by [`DashMap`].
//!
//! Collections are maps of `id -> document`. Filter matching, dotted-path
//! sorting and projection follow the semantics described on the
//! [`Collection`] trait.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::config::StoreConfig;

use super::traits::{
    Collection, DocumentStore, FindOptions, SortOrder, StoreError, StoreProvider, WriteOutcome,
};

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

/// Whether `doc` satisfies `filter`.
///
/// An empty or non-object filter matches everything. A field matches on
/// equality, or on membership when the stored field is an array.
fn matches(doc: &Value, filter: &Value) -> bool {
    let Some(fields) = filter.as_object() else {
        return true;
    };
    fields.iter().all(|(key, expected)| match doc.get(key) {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
        None => false,
    })
}

/// Resolve a dotted path (`votes.funny`) inside a document.
fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |value, segment| value.get(segment))
}

/// Total order over optional field values for sorting: missing sorts below
/// everything, numbers compare numerically, strings lexicographically.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => match (left.as_str(), right.as_str()) {
                (Some(l), Some(r)) => l.cmp(r),
                _ => Ordering::Equal,
            },
        },
    }
}

fn project(doc: Value, fields: &[String]) -> Value {
    let Value::Object(map) = doc else { return doc };
    Value::Object(
        map.into_iter()
            .filter(|(key, _)| fields.iter().any(|f| f == key))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// MemoryCollection
// ---------------------------------------------------------------------------

/// One in-memory collection, keyed by the document's `"id"` field.
#[derive(Default)]
pub struct MemoryCollection {
    docs: DashMap<String, Value>,
}

impl MemoryCollection {
    fn first_matching_key(&self, filter: &Value) -> Option<String> {
        self.docs
            .iter()
            .find(|entry| matches(entry.value(), filter))
            .map(|entry| entry.key().clone())
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn insert_one(&self, doc: Value) -> Result<WriteOutcome, StoreError> {
        let key = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingKey)?
            .to_string();

        use dashmap::mapref::entry::Entry;
        match self.docs.entry(key.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey { key }),
            Entry::Vacant(vacant) => {
                vacant.insert(doc);
                Ok(WriteOutcome::acknowledged(1))
            }
        }
    }

    async fn find_one(&self, filter: &Value) -> Result<Option<Value>, StoreError> {
        Ok(self
            .docs
            .iter()
            .find(|entry| matches(entry.value(), filter))
            .map(|entry| entry.value().clone()))
    }

    async fn find(&self, filter: &Value, options: FindOptions) -> Result<Vec<Value>, StoreError> {
        let mut found: Vec<Value> = self
            .docs
            .iter()
            .filter(|entry| matches(entry.value(), filter))
            .map(|entry| entry.value().clone())
            .collect();

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                let ordering =
                    compare_fields(lookup_path(a, &sort.path), lookup_path(b, &sort.path));
                match sort.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = options.limit {
            found.truncate(limit);
        }

        if let Some(fields) = &options.projection {
            found = found.into_iter().map(|doc| project(doc, fields)).collect();
        }

        Ok(found)
    }

    async fn update_one(&self, filter: &Value, set: &Value) -> Result<WriteOutcome, StoreError> {
        let Some(key) = self.first_matching_key(filter) else {
            return Ok(WriteOutcome::acknowledged(0));
        };

        let Some(mut entry) = self.docs.get_mut(&key) else {
            // The document was deleted between lookup and lock.
            return Ok(WriteOutcome::acknowledged(0));
        };
        if !matches(entry.value(), filter) {
            return Ok(WriteOutcome::acknowledged(0));
        }

        let before = entry.value().clone();
        if let (Value::Object(doc), Some(assignments)) = (entry.value_mut(), set.as_object()) {
            for (field, value) in assignments {
                doc.insert(field.clone(), value.clone());
            }
        }

        let affected = u64::from(*entry.value() != before);
        Ok(WriteOutcome::acknowledged(affected))
    }

    async fn delete_one(&self, filter: &Value) -> Result<WriteOutcome, StoreError> {
        let Some(key) = self.first_matching_key(filter) else {
            return Ok(WriteOutcome::acknowledged(0));
        };
        let removed = self
            .docs
            .remove_if(&key, |_, doc| matches(doc, filter))
            .is_some();
        Ok(WriteOutcome::acknowledged(u64::from(removed)))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.docs.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store: a namespace of lazily-created collections.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<MemoryCollection>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        self.collections
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        debug!("memory store closed");
        Ok(())
    }
}

/// Provider handing out one shared [`MemoryStore`].
///
/// Every generation opened by the supervisor sees the same data, so a
/// restart behaves like reconnecting to the same database.
pub struct MemoryStoreProvider {
    store: Arc<MemoryStore>,
}

impl MemoryStoreProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Direct access to the backing store, for seeding test data.
    #[must_use]
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

impl Default for MemoryStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreProvider for MemoryStoreProvider {
    async fn open(&self, _config: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
        Ok(self.store.clone() as Arc<dyn DocumentStore>)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
