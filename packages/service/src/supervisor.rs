//! Process-level lifecycle: start, run, restart, stop.
//!
//! The supervisor owns the generation state machine
//! (`Idle -> Starting -> Running -> Stopping -> (Idle | Starting)`) and is
//! the single point deciding process-fatal vs. restart-and-retry. Stop and
//! start never overlap: teardown runs to completion before the next
//! generation begins, so two binding sets can never claim the same
//! channels concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::broker::{Broker, Subscription};
use crate::config::{BootstrapConfig, ConfigChanged, ServiceConfig, StartupConfig};
use crate::contests::ContestService;
use crate::registry::OperationRegistry;
use crate::store::{DocumentStore, StoreProvider};

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not started, or fully shut down.
    Idle,
    /// Resolving configuration and binding operations.
    Starting,
    /// All bindings listening.
    Running,
    /// Tearing a generation down (shutdown or restart).
    Stopping,
}

/// What ended a running generation.
enum Exit {
    Shutdown,
    Restart,
}

/// One start-to-stop lifetime of the service.
struct Generation {
    config: ServiceConfig,
    store: Arc<dyn DocumentStore>,
    service: Arc<ContestService>,
    registry: OperationRegistry,
}

/// Drives the whole service through its lifecycle.
pub struct Supervisor {
    broker: Arc<dyn Broker>,
    stores: Arc<dyn StoreProvider>,
    bootstrap: BootstrapConfig,
    state: ArcSwap<LifecycleState>,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        stores: Arc<dyn StoreProvider>,
        bootstrap: BootstrapConfig,
    ) -> Self {
        Self {
            broker,
            stores,
            bootstrap,
            state: ArcSwap::from_pointee(LifecycleState::Idle),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(Arc::new(state));
    }

    /// Runs the service until `shutdown` resolves or startup fails
    /// repeatedly.
    ///
    /// # Errors
    ///
    /// Returns the startup fault after `max_start_attempts` consecutive
    /// failures; the process is expected to exit non-zero on it.
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        tokio::pin!(shutdown);

        // The config-change subscription outlives generations so that
        // notifications arriving mid-restart are buffered, not lost.
        let mut changes: Option<Box<dyn Subscription>> = None;
        let mut policy = StartupConfig::default();

        loop {
            self.set_state(LifecycleState::Starting);
            let mut generation = match self.start_with_retries(&mut changes, &policy).await {
                Ok(generation) => generation,
                Err(fault) => {
                    self.set_state(LifecycleState::Idle);
                    self.drop_subscription(&mut changes).await;
                    return Err(fault);
                }
            };
            policy = generation.config.startup.clone();
            self.set_state(LifecycleState::Running);
            info!("contests service running");

            // Coalesce: anything that piled up during the restart window
            // collapses into at most one further restart.
            let buffered_restart = Self::drain_buffered(changes.as_mut());
            let exit = if buffered_restart {
                info!("configuration changed during restart, restarting again");
                Exit::Restart
            } else {
                self.wait_for_exit(&mut shutdown, &mut changes).await
            };

            self.set_state(LifecycleState::Stopping);
            self.stop_generation(&mut generation).await;

            match exit {
                Exit::Shutdown => {
                    self.drop_subscription(&mut changes).await;
                    self.set_state(LifecycleState::Idle);
                    info!("contests service shut down");
                    return Ok(());
                }
                Exit::Restart => {
                    info!("restarting with fresh configuration");
                }
            }
        }
    }

    async fn start_with_retries(
        &self,
        changes: &mut Option<Box<dyn Subscription>>,
        policy: &StartupConfig,
    ) -> anyhow::Result<Generation> {
        let mut attempt: u32 = 1;
        loop {
            match self.start_generation(changes).await {
                Ok(generation) => return Ok(generation),
                Err(fault) if attempt < policy.max_start_attempts => {
                    warn!(attempt, %fault, "startup failed, retrying");
                    tokio::time::sleep(Duration::from_millis(policy.retry_delay_ms)).await;
                    attempt += 1;
                }
                Err(fault) => {
                    return Err(fault.context(format!(
                        "startup failed after {attempt} attempt(s)"
                    )));
                }
            }
        }
    }

    /// Brings one generation up: resolve config, open the store, connect
    /// publishers, bind all operations. Unwinds whatever partially started
    /// on failure.
    async fn start_generation(
        &self,
        changes: &mut Option<Box<dyn Subscription>>,
    ) -> anyhow::Result<Generation> {
        if changes.is_none() {
            *changes = Some(
                self.broker
                    .subscribe(&self.bootstrap.changed_topic)
                    .await
                    .context("cannot subscribe to configuration changes")?,
            );
        }

        let config = ServiceConfig::resolve(self.broker.as_ref(), &self.bootstrap)
            .await
            .context("cannot resolve configuration")?;

        let store = self
            .stores
            .open(&config.store)
            .await
            .context("cannot open document store")?;
        store.initialize().await.context("cannot initialize store")?;

        let service = Arc::new(ContestService::new(
            store.as_ref(),
            self.broker.as_ref(),
            &config,
        ));

        if let Err(fault) = service.startup().await {
            service.shutdown().await;
            Self::close_store(&store).await;
            return Err(anyhow::Error::from(fault).context("cannot connect event publishers"));
        }

        let workers = service
            .bindings(&config.channels)
            .into_iter()
            .map(|binding| binding.into_worker(self.broker.as_ref()))
            .collect();

        let mut registry = OperationRegistry::new();
        if let Err(fault) = registry.start_all(workers).await {
            service.shutdown().await;
            Self::close_store(&store).await;
            return Err(fault.context("cannot start operation bindings"));
        }

        Ok(Generation {
            config,
            store,
            service,
            registry,
        })
    }

    /// Waits in the Running state for either the shutdown signal or a
    /// relevant configuration change.
    async fn wait_for_exit(
        &self,
        shutdown: &mut (impl Future<Output = ()> + Unpin),
        changes: &mut Option<Box<dyn Subscription>>,
    ) -> Exit {
        loop {
            tokio::select! {
                () = &mut *shutdown => return Exit::Shutdown,
                notification = Self::next_change(changes.as_mut()) => {
                    match notification {
                        Some(changed) if changed.is_relevant() => {
                            info!(keys = ?changed.keys, "relevant configuration change");
                            return Exit::Restart;
                        }
                        Some(changed) => {
                            info!(keys = ?changed.keys, "ignoring configuration change");
                        }
                        None => {
                            warn!("configuration-change subscription closed");
                            *changes = None;
                        }
                    }
                }
            }
        }
    }

    /// Next parsed notification, or pending forever when unsubscribed so
    /// the select above only reacts to shutdown.
    async fn next_change(changes: Option<&mut Box<dyn Subscription>>) -> Option<ConfigChanged> {
        match changes {
            Some(subscription) => subscription
                .recv()
                .await
                .map(|payload| serde_json::from_value(payload).unwrap_or_default()),
            None => futures_util::future::pending().await,
        }
    }

    /// Whether any already-buffered notification demands a restart.
    fn drain_buffered(changes: Option<&mut Box<dyn Subscription>>) -> bool {
        let Some(subscription) = changes else {
            return false;
        };
        let mut restart = false;
        while let Some(payload) = subscription.try_recv() {
            let changed: ConfigChanged = serde_json::from_value(payload).unwrap_or_default();
            restart |= changed.is_relevant();
        }
        restart
    }

    /// Tears a generation down. Every step is attempted regardless of
    /// earlier failures in the sweep.
    async fn stop_generation(&self, generation: &mut Generation) {
        generation.registry.stop_all().await;
        generation.service.shutdown().await;
        Self::close_store(&generation.store).await;
    }

    async fn close_store(store: &Arc<dyn DocumentStore>) {
        if let Err(error) = store.close().await {
            warn!(%error, "cannot close document store");
        }
    }

    async fn drop_subscription(&self, changes: &mut Option<Box<dyn Subscription>>) {
        if let Some(mut subscription) = changes.take() {
            if let Err(error) = subscription.unsubscribe().await {
                warn!(%error, "cannot unsubscribe from configuration changes");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::broker::{handler_fn, MemoryBroker, RequestWorker, TopicPublisher};
    use crate::store::MemoryStoreProvider;

    async fn serve_config(broker: &MemoryBroker) -> Box<dyn RequestWorker> {
        let document = serde_json::to_value(ServiceConfig::default()).unwrap();
        let responder = broker.worker(
            "config.get",
            handler_fn(move |_| {
                let document = document.clone();
                async move { Ok(document) }
            }),
        );
        responder.listen().await.unwrap();
        responder
    }

    struct Harness {
        broker: MemoryBroker,
        supervisor: Arc<Supervisor>,
        shutdown: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<anyhow::Result<()>>,
        _config: Box<dyn RequestWorker>,
    }

    async fn start_harness() -> Harness {
        let broker = MemoryBroker::new();
        let config = serve_config(&broker).await;
        let supervisor = Arc::new(Supervisor::new(
            Arc::new(broker.clone()),
            Arc::new(MemoryStoreProvider::new()),
            BootstrapConfig::default(),
        ));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move {
                supervisor
                    .run(async move {
                        let _ = shutdown_rx.await;
                    })
                    .await
            })
        };

        wait_until_responding(&broker).await;
        Harness {
            broker,
            supervisor,
            shutdown: shutdown_tx,
            task,
            _config: config,
        }
    }

    /// Polls until the list channel answers, i.e. the generation is up.
    async fn wait_until_responding(broker: &MemoryBroker) {
        for _ in 0..200 {
            let reply = broker
                .request("contests.list", json!({ "onlyRunning": false }))
                .await;
            if reply.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("service never started responding");
    }

    /// A request that rides out a restart window by retrying transport
    /// errors.
    async fn request_ok(
        broker: &MemoryBroker,
        channel: &str,
        payload: serde_json::Value,
    ) -> serde_json::Value {
        for _ in 0..200 {
            match broker.request(channel, payload.clone()).await {
                Ok(reply) => return reply,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
        panic!("request on {channel} never got a reply");
    }

    #[tokio::test]
    async fn runs_until_shutdown_then_returns_to_idle() {
        let harness = start_harness().await;
        assert_eq!(harness.supervisor.state(), LifecycleState::Running);

        let reply = harness
            .broker
            .request(
                "contests.create",
                json!({"id": "a", "tag": "t", "emoji": "x"}),
            )
            .await
            .unwrap();
        assert_eq!(reply, json!(true));

        harness.shutdown.send(()).unwrap();
        harness.task.await.unwrap().unwrap();
        assert_eq!(harness.supervisor.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn relevant_config_change_restarts_with_same_behavior() {
        let harness = start_harness().await;
        let reply = harness
            .broker
            .request(
                "contests.create",
                json!({"id": "a", "tag": "t", "emoji": "x"}),
            )
            .await
            .unwrap();
        assert_eq!(reply, json!(true));

        let notifier = harness.broker.publisher("config.changed");
        notifier.connect().await.unwrap();
        assert_eq!(
            notifier.publish(json!({"keys": ["store"]})).await.unwrap(),
            1,
            "the supervisor should be subscribed"
        );

        // The channels come back after the restart window, with the data
        // still there: the duplicate id is still rejected.
        wait_until_responding(&harness.broker).await;
        let reply = request_ok(
            &harness.broker,
            "contests.create",
            json!({"id": "a", "tag": "t", "emoji": "x"}),
        )
        .await;
        assert_eq!(reply, json!(false));

        harness.shutdown.send(()).unwrap();
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn irrelevant_config_change_is_ignored() {
        let harness = start_harness().await;

        let notifier = harness.broker.publisher("config.changed");
        notifier.connect().await.unwrap();
        notifier
            .publish(json!({"keys": ["telegram", "logging"]}))
            .await
            .unwrap();

        // Give the supervisor a moment; it must keep the same generation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.supervisor.state(), LifecycleState::Running);
        let reply = harness
            .broker
            .request("contests.list", json!({}))
            .await
            .unwrap();
        assert_eq!(reply, json!([]));

        harness.shutdown.send(()).unwrap();
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_startup_failure_is_fatal() {
        // No config responder: resolution fails on every attempt.
        let broker = MemoryBroker::new();
        let supervisor = Supervisor::new(
            Arc::new(broker),
            Arc::new(MemoryStoreProvider::new()),
            BootstrapConfig::default(),
        );

        let result = supervisor.run(std::future::pending()).await;
        assert!(result.is_err());
        assert_eq!(supervisor.state(), LifecycleState::Idle);
    }
}
