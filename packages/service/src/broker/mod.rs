//! Broker seam: request/response workers and publish/subscribe topics.
//!
//! The wire protocol and delivery guarantees belong to the broker itself;
//! this module only defines the traits the service programs against and an
//! in-process [`MemoryBroker`] engine used by the dev binary and the tests.

pub mod memory;
pub mod traits;

pub use memory::MemoryBroker;
pub use traits::{
    handler_fn, Broker, BrokerError, HandlerError, RequestHandler, RequestWorker, Subscription,
    TopicPublisher,
};
