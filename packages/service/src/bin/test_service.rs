//! Self-contained dev service: in-process broker and store.
//!
//! Runs the full supervisor against a `MemoryBroker` with a seeded
//! `config.get` responder, so the operation channels can be exercised
//! end to end without external infrastructure.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use contests_service::broker::handler_fn;
use contests_service::store::MemoryStoreProvider;
use contests_service::{
    BootstrapConfig, Broker, MemoryBroker, RequestWorker, ServiceConfig, Supervisor,
};

#[derive(Debug, Parser)]
#[command(name = "test-service", about = "Contests service over an in-process broker")]
struct Args {
    /// Request channel answering with the config document.
    #[arg(long, env = "CONTESTS_CONFIG_CHANNEL", default_value = "config.get")]
    config_channel: String,

    /// Topic carrying configuration-change notifications.
    #[arg(long, env = "CONTESTS_CONFIG_CHANGED", default_value = "config.changed")]
    config_changed: String,

    /// Log filter, e.g. `info` or `contests_service=debug`.
    #[arg(long, env = "CONTESTS_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let broker = MemoryBroker::new();

    // Seed a config responder so the supervisor has something to resolve
    // against. A real deployment has an external config service here.
    let config_document = match serde_json::to_value(ServiceConfig::default()) {
        Ok(document) => document,
        Err(error) => {
            error!(%error, "cannot encode default configuration");
            return ExitCode::FAILURE;
        }
    };
    let config_responder = broker.worker(
        &args.config_channel,
        handler_fn(move |_| {
            let document = config_document.clone();
            async move { Ok(document) }
        }),
    );
    if let Err(error) = config_responder.listen().await {
        error!(%error, "cannot start config responder");
        return ExitCode::FAILURE;
    }

    let supervisor = Supervisor::new(
        Arc::new(broker),
        Arc::new(MemoryStoreProvider::new()),
        BootstrapConfig {
            get_channel: args.config_channel,
            changed_topic: args.config_changed,
        },
    );

    info!("starting contests service");
    match supervisor.run(wait_for_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(fault) => {
            error!(%fault, "service failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on SIGINT, SIGTERM or SIGQUIT.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(_) => return,
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(_) => return,
        };
        let mut quit = match signal(SignalKind::quit()) {
            Ok(stream) => stream,
            Err(_) => return,
        };
        tokio::select! {
            _ = interrupt.recv() => info!("received SIGINT"),
            _ = terminate.recv() => info!("received SIGTERM"),
            _ = quit.recv() => info!("received SIGQUIT"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}
