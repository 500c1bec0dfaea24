//! Store traits and the typed write-result descriptor.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::StoreConfig;

/// What the store reports back for a write.
///
/// Checked at the gateway boundary instead of poking at driver-specific
/// response shapes per handler: a write only counts as applied when it was
/// acknowledged AND affected exactly one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub acknowledged: bool,
    pub affected: u64,
}

impl WriteOutcome {
    /// An acknowledged write that touched `affected` documents.
    #[must_use]
    pub fn acknowledged(affected: u64) -> Self {
        Self {
            acknowledged: true,
            affected,
        }
    }

    /// True when the store acknowledged and exactly one document changed.
    #[must_use]
    pub fn applied_exactly_one(&self) -> bool {
        self.acknowledged && self.affected == 1
    }
}

/// Failures raised by the store itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate primary key '{key}'")]
    DuplicateKey { key: String },
    #[error("document has no string 'id' field")]
    MissingKey,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Sort direction for [`FindOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort by a dotted field path, e.g. `votes.funny`.
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub path: String,
    pub order: SortOrder,
}

impl SortSpec {
    #[must_use]
    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Options for [`Collection::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
    /// When set, returned documents keep only these fields.
    pub projection: Option<Vec<String>>,
}

/// One collection of JSON documents keyed by their `"id"` field.
///
/// Filters are objects matched Mongo-style: a document matches when every
/// filter field equals the document field, or the document field is an
/// array containing the filter value. Single-document writes are atomic.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Insert a new document. A duplicate primary key is a failure, never
    /// an upsert.
    async fn insert_one(&self, doc: Value) -> Result<WriteOutcome, StoreError>;

    /// Return the first document matching `filter`, if any.
    async fn find_one(&self, filter: &Value) -> Result<Option<Value>, StoreError>;

    /// Return all documents matching `filter`, shaped by `options`.
    async fn find(&self, filter: &Value, options: FindOptions) -> Result<Vec<Value>, StoreError>;

    /// Apply `set` (top-level field assignments) to the first matching
    /// document. `affected` counts documents whose content actually
    /// changed, so a no-op assignment reports zero.
    async fn update_one(&self, filter: &Value, set: &Value) -> Result<WriteOutcome, StoreError>;

    /// Delete the first document matching `filter`.
    async fn delete_one(&self, filter: &Value) -> Result<WriteOutcome, StoreError>;

    /// Number of documents in the collection.
    async fn count(&self) -> Result<u64, StoreError>;
}

/// A connected document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Access a collection by name, creating it lazily if the engine
    /// supports that.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    /// One-time setup (connect, create indexes).
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Release the connection.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens a [`DocumentStore`] for one service generation.
///
/// The supervisor calls this on every (re)start with freshly resolved
/// configuration, so no two generations alias connection state.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn open(&self, config: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_requires_ack_and_exactly_one() {
        assert!(WriteOutcome::acknowledged(1).applied_exactly_one());
        assert!(!WriteOutcome::acknowledged(0).applied_exactly_one());
        assert!(!WriteOutcome::acknowledged(2).applied_exactly_one());
        assert!(!WriteOutcome {
            acknowledged: false,
            affected: 1
        }
        .applied_exactly_one());
    }
}
