//! The six contest operations.
//!
//! Every mutation follows the same contract: persist first, verify exact
//! success, then notify. An event is never published before the store has
//! confirmed the write, and the mutation is never retried here; retries
//! belong to the caller.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use contests_core::{Contest, ContestRef, CreateContest, DomainEvent, ListContests, TopQuery};

use crate::broker::{handler_fn, Broker, BrokerError, HandlerError};
use crate::config::{ChannelConfig, ServiceConfig};
use crate::gateway::CollectionGateway;
use crate::publisher::EventPublisher;
use crate::registry::OperationBinding;
use crate::store::{Collection, DocumentStore, FindOptions, SortSpec, StoreError};

/// Faults raised by the query-only operations.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("contest does not exist")]
    ContestNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The contest domain service for one generation.
///
/// Stateless between requests: the store is the single source of truth,
/// and the only held resources are the collection handles and the event
/// publishers.
pub struct ContestService {
    contests: CollectionGateway,
    memes: Arc<dyn Collection>,
    events: EventPublisher,
}

impl ContestService {
    /// Wires the service against an opened store and the broker's topics.
    #[must_use]
    pub fn new(store: &dyn DocumentStore, broker: &dyn Broker, config: &ServiceConfig) -> Self {
        let contests = CollectionGateway::new(
            config.store.contests_collection.clone(),
            store.collection(&config.store.contests_collection),
        );
        let memes = store.collection(&config.store.memes_collection);
        let events = EventPublisher::new(broker, &config.topics);
        Self {
            contests,
            memes,
            events,
        }
    }

    /// Test seam: assemble from pre-built parts.
    #[must_use]
    pub fn from_parts(
        contests: CollectionGateway,
        memes: Arc<dyn Collection>,
        events: EventPublisher,
    ) -> Self {
        Self {
            contests,
            memes,
            events,
        }
    }

    /// Connects the event publishers.
    ///
    /// # Errors
    ///
    /// Fails fast on the first publisher that cannot connect.
    pub async fn startup(&self) -> Result<(), BrokerError> {
        self.events.connect_all().await
    }

    /// Disconnects the event publishers (attempting every one).
    pub async fn shutdown(&self) {
        self.events.disconnect_all().await;
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Create a contest. `running` always starts false.
    ///
    /// Returns false on a duplicate id or a store failure; no event is
    /// published in that case.
    pub async fn create(&self, req: CreateContest) -> bool {
        let contest = Contest::new(req.id, req.tag, req.emoji);
        let Ok(doc) = serde_json::to_value(&contest) else {
            warn!(id = %contest.id, "cannot encode contest document");
            return false;
        };

        if !self.contests.insert_applied(doc).await {
            return false;
        }
        self.events.publish(&DomainEvent::Created(contest)).await;
        true
    }

    /// List contests, optionally only the running ones.
    ///
    /// # Errors
    ///
    /// Store faults propagate: this is a query-only operation.
    pub async fn list(&self, req: ListContests) -> Result<Vec<Contest>, QueryError> {
        let filter = if req.only_running {
            json!({ "running": true })
        } else {
            json!({})
        };
        let docs = self.contests.find(&filter, FindOptions::default()).await?;
        docs.into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| {
                    QueryError::Store(StoreError::Unavailable(format!(
                        "malformed contest document: {e}"
                    )))
                })
            })
            .collect()
    }

    /// Delete a contest by id. False when it does not exist or the store
    /// fails; no event then.
    pub async fn delete(&self, req: ContestRef) -> bool {
        if !self.contests.delete_applied(&json!({ "id": req.id })).await {
            return false;
        }
        self.events.publish(&DomainEvent::Deleted { id: req.id }).await;
        true
    }

    /// Set a contest running. False when it does not exist, is already
    /// running, or the store fails; no event then.
    pub async fn start(&self, req: ContestRef) -> bool {
        if !self
            .contests
            .update_applied(&json!({ "id": req.id }), &json!({ "running": true }))
            .await
        {
            return false;
        }
        self.events.publish(&DomainEvent::Started { id: req.id }).await;
        true
    }

    /// Stop a running contest. False when it does not exist, is already
    /// stopped, or the store fails; no event then.
    pub async fn stop(&self, req: ContestRef) -> bool {
        if !self
            .contests
            .update_applied(&json!({ "id": req.id }), &json!({ "running": false }))
            .await
        {
            return false;
        }
        self.events.publish(&DomainEvent::Stopped { id: req.id }).await;
        true
    }

    /// The top memes of a contest: identifiers ordered by descending
    /// `votes.<voteType>`, at most `amount` of them.
    ///
    /// `voteType` and `amount` are caller-trusted.
    ///
    /// # Errors
    ///
    /// [`QueryError::ContestNotFound`] when the contest id is unknown;
    /// store faults propagate.
    pub async fn top(&self, req: TopQuery) -> Result<Vec<String>, QueryError> {
        let contest = self
            .contests
            .find_one(&json!({ "id": req.id }))
            .await?
            .ok_or(QueryError::ContestNotFound)?;
        let tag = contest.get("tag").and_then(Value::as_str).unwrap_or_default();

        let options = FindOptions {
            sort: Some(SortSpec::descending(format!("votes.{}", req.vote_type))),
            limit: Some(req.amount),
            projection: Some(vec!["id".to_string()]),
        };
        let memes = self.memes.find(&json!({ "tags": tag }), options).await?;

        Ok(memes
            .into_iter()
            .filter_map(|doc| doc.get("id").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Bindings
    // -----------------------------------------------------------------------

    /// The fixed binding set for one generation.
    #[must_use]
    pub fn bindings(self: &Arc<Self>, channels: &ChannelConfig) -> Vec<OperationBinding> {
        let create = {
            let service = Arc::clone(self);
            handler_fn(move |payload| {
                let service = Arc::clone(&service);
                async move {
                    let req: CreateContest = decode(payload)?;
                    Ok(Value::Bool(service.create(req).await))
                }
            })
        };
        let list = {
            let service = Arc::clone(self);
            handler_fn(move |payload| {
                let service = Arc::clone(&service);
                async move {
                    let req: ListContests = decode(payload)?;
                    let contests = service
                        .list(req)
                        .await
                        .map_err(|e| HandlerError::Failed(e.to_string()))?;
                    serde_json::to_value(contests)
                        .map_err(|e| HandlerError::Failed(e.to_string()))
                }
            })
        };
        let delete = {
            let service = Arc::clone(self);
            handler_fn(move |payload| {
                let service = Arc::clone(&service);
                async move {
                    let req: ContestRef = decode(payload)?;
                    Ok(Value::Bool(service.delete(req).await))
                }
            })
        };
        let start = {
            let service = Arc::clone(self);
            handler_fn(move |payload| {
                let service = Arc::clone(&service);
                async move {
                    let req: ContestRef = decode(payload)?;
                    Ok(Value::Bool(service.start(req).await))
                }
            })
        };
        let stop = {
            let service = Arc::clone(self);
            handler_fn(move |payload| {
                let service = Arc::clone(&service);
                async move {
                    let req: ContestRef = decode(payload)?;
                    Ok(Value::Bool(service.stop(req).await))
                }
            })
        };
        let top = {
            let service = Arc::clone(self);
            handler_fn(move |payload| {
                let service = Arc::clone(&service);
                async move {
                    let req: TopQuery = decode(payload)?;
                    let ids = service
                        .top(req)
                        .await
                        .map_err(|e| HandlerError::Failed(e.to_string()))?;
                    serde_json::to_value(ids).map_err(|e| HandlerError::Failed(e.to_string()))
                }
            })
        };

        vec![
            OperationBinding::new(channels.create.clone(), create),
            OperationBinding::new(channels.list.clone(), list),
            OperationBinding::new(channels.delete.clone(), delete),
            OperationBinding::new(channels.start.clone(), start),
            OperationBinding::new(channels.stop.clone(), stop),
            OperationBinding::new(channels.top.clone(), top),
        ]
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, HandlerError> {
    serde_json::from_value(payload).map_err(|e| HandlerError::BadRequest(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
