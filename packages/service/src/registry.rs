//! The binding set: named operations started and stopped together.
//!
//! Bindings are fixed per generation; they are never individually added or
//! removed while running. `start_all` is atomic in effect: if any binding
//! fails to listen, the subset that did start is unwound before the fault
//! surfaces. `stop_all` is best-effort per binding.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::broker::{Broker, RequestHandler, RequestWorker};

/// One named operation and its handler, not yet bound to the broker.
pub struct OperationBinding {
    pub name: String,
    pub handler: Arc<dyn RequestHandler>,
}

impl OperationBinding {
    #[must_use]
    pub fn new(name: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    /// Create the broker worker for this binding (still unbound).
    #[must_use]
    pub fn into_worker(self, broker: &dyn Broker) -> Box<dyn RequestWorker> {
        broker.worker(&self.name, self.handler)
    }
}

/// Manages the listening lifecycle of one generation's workers.
#[derive(Default)]
pub struct OperationRegistry {
    bound: Vec<Box<dyn RequestWorker>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently bound operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Start every worker, in order.
    ///
    /// # Errors
    ///
    /// On the first listen failure the already-started subset is stopped
    /// (best-effort) and the triggering fault is returned; the registry is
    /// left empty.
    pub async fn start_all(
        &mut self,
        workers: Vec<Box<dyn RequestWorker>>,
    ) -> anyhow::Result<()> {
        for worker in workers {
            if let Err(fault) = worker.listen().await {
                error!(
                    channel = %worker.channel(),
                    %fault,
                    "binding failed to start, unwinding the started subset"
                );
                self.stop_all().await;
                return Err(fault.into());
            }
            info!(channel = %worker.channel(), "operation bound");
            self.bound.push(worker);
        }
        Ok(())
    }

    /// Stop every bound worker.
    ///
    /// Each stop is attempted independently; a failure is logged and does
    /// not prevent stopping the rest. Afterwards the set is considered
    /// fully released regardless of individual failures.
    pub async fn stop_all(&mut self) {
        for worker in self.bound.drain(..) {
            match worker.stop().await {
                Ok(()) => info!(channel = %worker.channel(), "operation released"),
                Err(error) => {
                    warn!(channel = %worker.channel(), %error, "cannot stop worker");
                }
            }
        }
    }
}
