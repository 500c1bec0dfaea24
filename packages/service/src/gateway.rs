//! Write-verification layer over one collection.
//!
//! Mutations report a plain `bool`: `true` only when the store acknowledged
//! the write and exactly one document changed. Store faults on mutations
//! are logged and mapped to `false` so the operation contract stays
//! uniform. Reads propagate faults: "cannot answer a query" is distinct
//! from "write not applied".

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::store::{Collection, FindOptions, StoreError, WriteOutcome};

/// A named collection with outcome verification at the boundary.
pub struct CollectionGateway {
    name: String,
    collection: Arc<dyn Collection>,
}

impl CollectionGateway {
    #[must_use]
    pub fn new(name: impl Into<String>, collection: Arc<dyn Collection>) -> Self {
        Self {
            name: name.into(),
            collection,
        }
    }

    fn verify(&self, operation: &str, result: Result<WriteOutcome, StoreError>) -> bool {
        match result {
            Ok(outcome) if outcome.applied_exactly_one() => true,
            Ok(outcome) => {
                warn!(
                    collection = %self.name,
                    operation,
                    acknowledged = outcome.acknowledged,
                    affected = outcome.affected,
                    "write not applied"
                );
                false
            }
            Err(error) => {
                warn!(collection = %self.name, operation, %error, "write failed");
                false
            }
        }
    }

    /// Insert `doc`; true iff exactly one document was added.
    pub async fn insert_applied(&self, doc: Value) -> bool {
        let result = self.collection.insert_one(doc).await;
        self.verify("insert", result)
    }

    /// Apply `set` to the first match; true iff exactly one document changed.
    pub async fn update_applied(&self, filter: &Value, set: &Value) -> bool {
        let result = self.collection.update_one(filter, set).await;
        self.verify("update", result)
    }

    /// Delete the first match; true iff exactly one document was removed.
    pub async fn delete_applied(&self, filter: &Value) -> bool {
        let result = self.collection.delete_one(filter).await;
        self.verify("delete", result)
    }

    /// Read one document.
    ///
    /// # Errors
    ///
    /// Propagates store faults to the caller.
    pub async fn find_one(&self, filter: &Value) -> Result<Option<Value>, StoreError> {
        self.collection.find_one(filter).await
    }

    /// Read matching documents.
    ///
    /// # Errors
    ///
    /// Propagates store faults to the caller.
    pub async fn find(
        &self,
        filter: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        self.collection.find(filter, options).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    /// A collection whose every call fails at the transport level.
    struct UnreachableCollection;

    #[async_trait]
    impl Collection for UnreachableCollection {
        async fn insert_one(&self, _doc: Value) -> Result<WriteOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn find_one(&self, _filter: &Value) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn find(
            &self,
            _filter: &Value,
            _options: FindOptions,
        ) -> Result<Vec<Value>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn update_one(
            &self,
            _filter: &Value,
            _set: &Value,
        ) -> Result<WriteOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete_one(&self, _filter: &Value) -> Result<WriteOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn count(&self) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// A collection that acknowledges writes without applying them.
    struct PhantomWriteCollection;

    #[async_trait]
    impl Collection for PhantomWriteCollection {
        async fn insert_one(&self, _doc: Value) -> Result<WriteOutcome, StoreError> {
            Ok(WriteOutcome {
                acknowledged: false,
                affected: 1,
            })
        }
        async fn find_one(&self, _filter: &Value) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }
        async fn find(
            &self,
            _filter: &Value,
            _options: FindOptions,
        ) -> Result<Vec<Value>, StoreError> {
            Ok(Vec::new())
        }
        async fn update_one(
            &self,
            _filter: &Value,
            _set: &Value,
        ) -> Result<WriteOutcome, StoreError> {
            Ok(WriteOutcome::acknowledged(0))
        }
        async fn delete_one(&self, _filter: &Value) -> Result<WriteOutcome, StoreError> {
            Ok(WriteOutcome::acknowledged(2))
        }
        async fn count(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn transport_errors_map_to_false_for_mutations() {
        let gateway = CollectionGateway::new("contests", Arc::new(UnreachableCollection));
        assert!(!gateway.insert_applied(json!({"id": "a"})).await);
        assert!(!gateway.update_applied(&json!({"id": "a"}), &json!({})).await);
        assert!(!gateway.delete_applied(&json!({"id": "a"})).await);
    }

    #[tokio::test]
    async fn transport_errors_propagate_for_reads() {
        let gateway = CollectionGateway::new("contests", Arc::new(UnreachableCollection));
        assert!(gateway.find_one(&json!({})).await.is_err());
        assert!(gateway.find(&json!({}), FindOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn unacknowledged_or_wrong_count_outcomes_are_not_applied() {
        let gateway = CollectionGateway::new("contests", Arc::new(PhantomWriteCollection));
        // Acknowledged=false with affected=1.
        assert!(!gateway.insert_applied(json!({"id": "a"})).await);
        // Acknowledged with affected=0.
        assert!(!gateway.update_applied(&json!({"id": "a"}), &json!({})).await);
        // Acknowledged with affected=2.
        assert!(!gateway.delete_applied(&json!({"id": "a"})).await);
    }
}
