//! Contests service: operation bindings, event emission, and lifecycle
//! supervision over a shared message broker.
//!
//! The service exposes its state exclusively through broker-carried
//! request/response operations and event notifications:
//!
//! 1. **Bindings** ([`registry`]): named operations registered as
//!    broker-addressable request handlers, started and stopped as a set.
//! 2. **Events** ([`publisher`]): domain-change notifications published only
//!    after the corresponding mutation is durably confirmed.
//! 3. **Supervision** ([`supervisor`]): a process-level state machine that
//!    starts all bindings, stops them cleanly, and restarts the whole
//!    generation when externally-held configuration changes.

pub mod broker;
pub mod config;
pub mod contests;
pub mod gateway;
pub mod publisher;
pub mod registry;
pub mod store;
pub mod supervisor;

pub use broker::{Broker, BrokerError, MemoryBroker, RequestHandler, RequestWorker};
pub use config::{BootstrapConfig, ServiceConfig};
pub use contests::ContestService;
pub use gateway::CollectionGateway;
pub use publisher::EventPublisher;
pub use registry::{OperationBinding, OperationRegistry};
pub use store::{Collection, DocumentStore, MemoryStore, StoreProvider};
pub use supervisor::{LifecycleState, Supervisor};
