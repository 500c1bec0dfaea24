//! Domain-event emission.
//!
//! One publisher handle per topic. Events are fire-and-forget once the
//! mutation has committed: a zero-receiver publish or a transport error is
//! an observability signal, never an operation failure. The mutation must
//! not be reported as failed for a notification problem.

use contests_core::{DomainEvent, EventKind};
use tracing::{debug, warn};

use crate::broker::{Broker, BrokerError, TopicPublisher};
use crate::config::TopicConfig;

/// The per-topic publisher set for one service generation.
pub struct EventPublisher {
    publishers: Vec<(EventKind, Box<dyn TopicPublisher>)>,
}

impl EventPublisher {
    /// Creates unconnected publishers for all four topics.
    #[must_use]
    pub fn new(broker: &dyn Broker, topics: &TopicConfig) -> Self {
        let publishers = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let topic = match kind {
                    EventKind::Created => &topics.created,
                    EventKind::Deleted => &topics.deleted,
                    EventKind::Started => &topics.started,
                    EventKind::Stopped => &topics.stopped,
                };
                (kind, broker.publisher(topic))
            })
            .collect();
        Self { publishers }
    }

    /// Assembles a publisher set from pre-built handles.
    #[must_use]
    pub fn from_publishers(publishers: Vec<(EventKind, Box<dyn TopicPublisher>)>) -> Self {
        Self { publishers }
    }

    fn publisher_for(&self, kind: EventKind) -> Option<&dyn TopicPublisher> {
        self.publishers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| p.as_ref())
    }

    /// Connects every publisher, failing on the first error.
    ///
    /// # Errors
    ///
    /// Returns the first connect failure; the caller is expected to tear
    /// the generation down via [`disconnect_all`](Self::disconnect_all).
    pub async fn connect_all(&self) -> Result<(), BrokerError> {
        for (_, publisher) in &self.publishers {
            publisher.connect().await?;
        }
        Ok(())
    }

    /// Disconnects every publisher, attempting each one regardless of
    /// earlier failures in the sweep. Failures are logged, not re-raised.
    pub async fn disconnect_all(&self) {
        for (_, publisher) in &self.publishers {
            if let Err(error) = publisher.disconnect().await {
                warn!(topic = %publisher.topic(), %error, "cannot disconnect publisher");
            }
        }
    }

    /// Publishes an event for a confirmed mutation.
    ///
    /// Zero receivers and transport failures are logged at warn level and
    /// otherwise ignored.
    pub async fn publish(&self, event: &DomainEvent) {
        let Some(publisher) = self.publisher_for(event.kind()) else {
            warn!(kind = ?event.kind(), "no publisher wired for event kind, dropping event");
            return;
        };
        match publisher.publish(event.payload()).await {
            Ok(0) => {
                warn!(topic = %publisher.topic(), "event published but nobody was listening");
            }
            Ok(receivers) => {
                debug!(topic = %publisher.topic(), receivers, "event published");
            }
            Err(error) => {
                warn!(topic = %publisher.topic(), %error, "cannot publish event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use contests_core::Contest;
    use serde_json::Value;

    use super::*;

    /// Publisher stub that records calls and can be told to fail.
    struct RecordingPublisher {
        name: &'static str,
        connected: Arc<AtomicBool>,
        disconnects: Arc<AtomicU32>,
        publishes: Arc<AtomicU32>,
        fail_disconnect: bool,
    }

    #[async_trait]
    impl TopicPublisher for RecordingPublisher {
        async fn connect(&self) -> Result<(), BrokerError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn publish(&self, _payload: Value) -> Result<usize, BrokerError> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        async fn disconnect(&self) -> Result<(), BrokerError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.fail_disconnect {
                return Err(BrokerError::NotConnected {
                    topic: self.name.to_string(),
                });
            }
            Ok(())
        }

        fn topic(&self) -> &str {
            self.name
        }
    }

    struct PublisherProbe {
        connected: Arc<AtomicBool>,
        disconnects: Arc<AtomicU32>,
        publishes: Arc<AtomicU32>,
    }

    fn recording(name: &'static str, fail_disconnect: bool) -> (Box<dyn TopicPublisher>, PublisherProbe) {
        let connected = Arc::new(AtomicBool::new(false));
        let disconnects = Arc::new(AtomicU32::new(0));
        let publishes = Arc::new(AtomicU32::new(0));
        let publisher = RecordingPublisher {
            name,
            connected: connected.clone(),
            disconnects: disconnects.clone(),
            publishes: publishes.clone(),
            fail_disconnect,
        };
        (
            Box::new(publisher),
            PublisherProbe {
                connected,
                disconnects,
                publishes,
            },
        )
    }

    #[tokio::test]
    async fn publish_routes_by_event_kind() {
        let (created, created_probe) = recording("contests.created", false);
        let (deleted, deleted_probe) = recording("contests.deleted", false);
        let (started, started_probe) = recording("contests.started", false);
        let (stopped, stopped_probe) = recording("contests.stopped", false);

        let events = EventPublisher::from_publishers(vec![
            (EventKind::Created, created),
            (EventKind::Deleted, deleted),
            (EventKind::Started, started),
            (EventKind::Stopped, stopped),
        ]);

        events
            .publish(&DomainEvent::Created(Contest::new("a", "t", "x")))
            .await;
        events.publish(&DomainEvent::Stopped { id: "a".into() }).await;

        assert_eq!(created_probe.publishes.load(Ordering::SeqCst), 1);
        assert_eq!(stopped_probe.publishes.load(Ordering::SeqCst), 1);
        assert_eq!(deleted_probe.publishes.load(Ordering::SeqCst), 0);
        assert_eq!(started_probe.publishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_for_an_unwired_kind_drops_the_event() {
        let (created, created_probe) = recording("contests.created", false);
        let events = EventPublisher::from_publishers(vec![(EventKind::Created, created)]);

        // No publisher registered for Stopped: the event is dropped and
        // nothing else receives it.
        events.publish(&DomainEvent::Stopped { id: "a".into() }).await;
        assert_eq!(created_probe.publishes.load(Ordering::SeqCst), 0);

        // The wired kind still works.
        events
            .publish(&DomainEvent::Created(Contest::new("a", "t", "x")))
            .await;
        assert_eq!(created_probe.publishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_all_attempts_every_publisher_despite_failures() {
        let (created, created_probe) = recording("contests.created", true);
        let (deleted, deleted_probe) = recording("contests.deleted", false);
        let (started, started_probe) = recording("contests.started", true);
        let (stopped, stopped_probe) = recording("contests.stopped", false);

        let events = EventPublisher::from_publishers(vec![
            (EventKind::Created, created),
            (EventKind::Deleted, deleted),
            (EventKind::Started, started),
            (EventKind::Stopped, stopped),
        ]);

        events.disconnect_all().await;

        for probe in [created_probe, deleted_probe, started_probe, stopped_probe] {
            assert_eq!(probe.disconnects.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn connect_all_connects_every_publisher() {
        let (created, created_probe) = recording("contests.created", false);
        let (deleted, deleted_probe) = recording("contests.deleted", false);
        let (started, started_probe) = recording("contests.started", false);
        let (stopped, stopped_probe) = recording("contests.stopped", false);

        let events = EventPublisher::from_publishers(vec![
            (EventKind::Created, created),
            (EventKind::Deleted, deleted),
            (EventKind::Started, started),
            (EventKind::Stopped, stopped),
        ]);

        events.connect_all().await.unwrap();

        for probe in [created_probe, deleted_probe, started_probe, stopped_probe] {
            assert!(probe.connected.load(Ordering::SeqCst));
        }
    }
}
