//! Process lifecycle: initial sync, then the event listener and the
//! periodic resync as two independent tasks.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::Config;
use crate::dispatcher::EventDispatcher;
use crate::reconciler::Reconciler;
use crate::registry::{RegistrationClient, Registry};
use crate::runtime::ContainerRuntime;

pub struct Scheduler {
    reconciler: Reconciler,
    dispatcher: EventDispatcher,
    interval: Duration,
}

/// The two long-running tasks, alive until aborted.
pub struct Running {
    events: JoinHandle<()>,
    resync: JoinHandle<()>,
}

impl Running {
    pub fn abort(&self) {
        self.events.abort();
        self.resync.abort();
    }
}

impl Scheduler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<dyn Registry>,
        config: Arc<Config>,
    ) -> Self {
        let client = RegistrationClient::new(registry, &config);
        Self {
            reconciler: Reconciler::new(runtime.clone(), client.clone(), config.clone()),
            dispatcher: EventDispatcher::new(runtime, client, config.clone()),
            interval: config.resync_interval(),
        }
    }

    /// Runs one full sync to completion, then spawns both loops.
    pub async fn start(self) -> Running {
        self.reconciler.sync_all().await;

        let dispatcher = self.dispatcher;
        let events = tokio::spawn(async move { dispatcher.run().await });

        let reconciler = self.reconciler;
        let interval = self.interval;
        let resync = tokio::spawn(async move { resync_loop(reconciler, interval).await });

        info!("Registrar active and watching events");
        Running { events, resync }
    }

    /// Starts, then blocks until a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        let running = self.start().await;
        shutdown_signal().await;
        running.abort();
        info!("Shutdown complete.");
        Ok(())
    }
}

/// Sleeps, then resyncs. A pass always completes before the next sleep.
async fn resync_loop(reconciler: Reconciler, interval: Duration) {
    info!("Resync loop started (interval: {}s)", interval.as_secs());
    loop {
        sleep(interval).await;
        reconciler.sync_all().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
