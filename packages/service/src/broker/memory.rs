//! In-process [`Broker`] implementation.
//!
//! Request channels are mpsc queues with oneshot reply envelopes; topics are
//! tokio broadcast channels. A request channel can be claimed by exactly one
//! worker at a time, which is what makes overlapping binding generations
//! observable as an error instead of silent double-consumption.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::debug;

use super::traits::{
    Broker, BrokerError, RequestHandler, RequestWorker, Subscription, TopicPublisher,
};

/// Outbound queue depth per request channel and per topic.
const CHANNEL_CAPACITY: usize = 64;

struct RequestEnvelope {
    payload: Value,
    reply: oneshot::Sender<Result<Value, String>>,
}

#[derive(Default)]
struct Inner {
    /// Claimed request channels: channel name -> queue into the owning worker.
    channels: DashMap<String, mpsc::Sender<RequestEnvelope>>,
    /// Topic fan-out senders, created lazily on first connect or subscribe.
    topics: DashMap<String, broadcast::Sender<Value>>,
}

impl Inner {
    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Value> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// In-process broker engine.
///
/// Cheap to clone; all clones share the same channel and topic space.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn worker(&self, channel: &str, handler: Arc<dyn RequestHandler>) -> Box<dyn RequestWorker> {
        Box::new(MemoryWorker {
            inner: Arc::clone(&self.inner),
            channel: channel.to_string(),
            handler,
            listening: Mutex::new(None),
        })
    }

    fn publisher(&self, topic: &str) -> Box<dyn TopicPublisher> {
        Box::new(MemoryPublisher {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            sender: parking_lot::RwLock::new(None),
        })
    }

    async fn request(&self, channel: &str, payload: Value) -> Result<Value, BrokerError> {
        let tx = self
            .inner
            .channels
            .get(channel)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BrokerError::NoResponder {
                channel: channel.to_string(),
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(RequestEnvelope {
            payload,
            reply: reply_tx,
        })
        .await
        .map_err(|_| BrokerError::NoResponder {
            channel: channel.to_string(),
        })?;

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(BrokerError::Fault { message }),
            Err(_) => Err(BrokerError::NoReply {
                channel: channel.to_string(),
            }),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BrokerError> {
        let receiver = self.inner.topic_sender(topic).subscribe();
        Ok(Box::new(MemorySubscription {
            receiver: Some(receiver),
        }))
    }
}

// ---------------------------------------------------------------------------
// MemoryWorker
// ---------------------------------------------------------------------------

struct ListeningState {
    shutdown: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

struct MemoryWorker {
    inner: Arc<Inner>,
    channel: String,
    handler: Arc<dyn RequestHandler>,
    listening: Mutex<Option<ListeningState>>,
}

#[async_trait]
impl RequestWorker for MemoryWorker {
    async fn listen(&self) -> Result<(), BrokerError> {
        let mut listening = self.listening.lock().await;
        if listening.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<RequestEnvelope>(CHANNEL_CAPACITY);
        use dashmap::mapref::entry::Entry;
        match self.inner.channels.entry(self.channel.clone()) {
            Entry::Occupied(_) => {
                return Err(BrokerError::ChannelClaimed {
                    channel: self.channel.clone(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(tx);
            }
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = rx.recv() => {
                        let Some(envelope) = envelope else { break };
                        // Each request runs on its own task so a slow
                        // handler never stalls the rest of the queue.
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            let result = handler
                                .handle(envelope.payload)
                                .await
                                .map_err(|e| e.to_string());
                            let _ = envelope.reply.send(result);
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        debug!(channel = %self.channel, "worker listening");
        *listening = Some(ListeningState {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let mut listening = self.listening.lock().await;
        let Some(state) = listening.take() else {
            return Ok(());
        };

        // Release the claim first so no new requests are queued, then let
        // the serving task wind down.
        self.inner.channels.remove(&self.channel);
        let _ = state.shutdown.send(());
        let _ = state.task.await;

        debug!(channel = %self.channel, "worker stopped");
        Ok(())
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}

// ---------------------------------------------------------------------------
// MemoryPublisher
// ---------------------------------------------------------------------------

struct MemoryPublisher {
    inner: Arc<Inner>,
    topic: String,
    sender: parking_lot::RwLock<Option<broadcast::Sender<Value>>>,
}

#[async_trait]
impl TopicPublisher for MemoryPublisher {
    async fn connect(&self) -> Result<(), BrokerError> {
        let mut sender = self.sender.write();
        if sender.is_none() {
            *sender = Some(self.inner.topic_sender(&self.topic));
        }
        Ok(())
    }

    async fn publish(&self, payload: Value) -> Result<usize, BrokerError> {
        let sender = {
            let guard = self.sender.read();
            guard.clone().ok_or_else(|| BrokerError::NotConnected {
                topic: self.topic.clone(),
            })?
        };

        let receivers = sender.receiver_count();
        if receivers > 0 {
            // A send error here means every receiver dropped between the
            // count and the send; report zero receivers instead.
            if sender.send(payload).is_err() {
                return Ok(0);
            }
        }
        Ok(receivers)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.sender.write().take();
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

// ---------------------------------------------------------------------------
// MemorySubscription
// ---------------------------------------------------------------------------

struct MemorySubscription {
    receiver: Option<broadcast::Receiver<Value>>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn recv(&mut self) -> Option<Value> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(value) => return Some(value),
                // Lagged receivers skip the lost messages and keep going.
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn try_recv(&mut self) -> Option<Value> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), BrokerError> {
        self.receiver.take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
