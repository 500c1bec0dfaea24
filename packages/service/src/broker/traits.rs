//! Object-safe broker traits.
//!
//! Implementations: in-process ([`MemoryBroker`](super::MemoryBroker)),
//! Redis-backed (future). All handles use interior mutability so they can
//! be shared behind `Arc` across request tasks.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level broker failures.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("channel '{channel}' is already claimed by another worker")]
    ChannelClaimed { channel: String },
    #[error("no responder listening on channel '{channel}'")]
    NoResponder { channel: String },
    #[error("responder on channel '{channel}' went away before replying")]
    NoReply { channel: String },
    #[error("publisher for topic '{topic}' is not connected")]
    NotConnected { topic: String },
    /// A fault reply produced by the remote handler, carried back to the
    /// requester as an error value rather than a transport failure.
    #[error("request failed: {message}")]
    Fault { message: String },
}

/// Failures a request handler reports back to its caller.
///
/// These cross the broker as fault replies; they never tear down the worker.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Handles one named operation's request payloads.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response value for a request, or a fault reply.
    async fn handle(&self, payload: Value) -> Result<Value, HandlerError>;
}

/// A claim on one request channel.
///
/// Created unbound; [`listen`](RequestWorker::listen) claims the channel and
/// starts serving, [`stop`](RequestWorker::stop) releases it. Both are
/// idempotent per worker, but a channel can only be claimed by one worker
/// at a time.
#[async_trait]
pub trait RequestWorker: Send + Sync {
    /// Claim the channel and start serving requests.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ChannelClaimed`] if another worker already
    /// holds the channel.
    async fn listen(&self) -> Result<(), BrokerError>;

    /// Release the channel and stop serving. No-op if not listening.
    async fn stop(&self) -> Result<(), BrokerError>;

    /// The channel this worker serves.
    fn channel(&self) -> &str;
}

/// An outbound handle for one event topic.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Open the underlying channel. No-op if already connected.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Publish a payload, returning the number of receivers that were
    /// listening. Zero receivers is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConnected`] if `connect` was never called.
    async fn publish(&self, payload: Value) -> Result<usize, BrokerError>;

    /// Release the underlying channel. No-op if not connected.
    async fn disconnect(&self) -> Result<(), BrokerError>;

    /// The topic this publisher targets.
    fn topic(&self) -> &str;
}

/// An inbound stream of topic payloads.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next payload. Returns `None` once the topic is gone.
    async fn recv(&mut self) -> Option<Value>;

    /// Take a payload only if one is already buffered.
    fn try_recv(&mut self) -> Option<Value>;

    /// Stop receiving. No-op if already unsubscribed.
    async fn unsubscribe(&mut self) -> Result<(), BrokerError>;
}

/// The broker's request/response and publish/subscribe primitives.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Create an unbound worker for a request channel.
    fn worker(&self, channel: &str, handler: Arc<dyn RequestHandler>) -> Box<dyn RequestWorker>;

    /// Create an unconnected publisher for a topic.
    fn publisher(&self, topic: &str) -> Box<dyn TopicPublisher>;

    /// Send a request and wait for its reply.
    async fn request(&self, channel: &str, payload: Value) -> Result<Value, BrokerError>;

    /// Subscribe to a topic.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BrokerError>;
}

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn handle(&self, payload: Value) -> Result<Value, HandlerError> {
        (self.0)(payload).await
    }
}

/// Wraps an async closure as a shareable [`RequestHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn handler_fn_adapts_a_closure() {
        let handler = handler_fn(|payload| async move { Ok(json!({ "echo": payload })) });
        let reply = handler.handle(json!(1)).await.unwrap();
        assert_eq!(reply, json!({ "echo": 1 }));
    }

    #[tokio::test]
    async fn handler_errors_render_their_message() {
        let handler = handler_fn(|_| async { Err(HandlerError::Failed("contest does not exist".into())) });
        let err = handler.handle(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "contest does not exist");
    }
}
