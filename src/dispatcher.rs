//! Live reaction to container lifecycle events.
//!
//! Arrivals (`start`, `update`) register the container's services after a
//! short grace period. Departures (`stop`, `die`, `destroy`) remove every
//! registry entry whose id ends in the container's short id. Registration
//! here never deletes and deregistration never registers; the periodic
//! resync remains the backstop for anything missed.

use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::config::Config;
use crate::error::RuntimeError;
use crate::labels;
use crate::registry::RegistrationClient;
use crate::runtime::ContainerRuntime;
use crate::types::{short_id, ContainerEvent, EventAction};

/// What handling a single event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    Registered(usize),
    Deregistered(usize),
}

#[derive(Clone)]
pub struct EventDispatcher {
    runtime: Arc<dyn ContainerRuntime>,
    registry: RegistrationClient,
    config: Arc<Config>,
}

impl EventDispatcher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: RegistrationClient,
        config: Arc<Config>,
    ) -> Self {
        Self {
            runtime,
            registry,
            config,
        }
    }

    /// Consumes the event stream forever, resubscribing after a backoff
    /// whenever it fails or ends.
    pub async fn run(&self) {
        info!("Docker event listener started");
        loop {
            match self.consume(self.runtime.events()).await {
                Ok(()) => warn!(
                    "Docker event stream ended. Reconnecting in {}s...",
                    self.config.event_backoff
                ),
                Err(e) => error!(
                    "Error in Docker event stream: {}. Reconnecting in {}s...",
                    e, self.config.event_backoff
                ),
            }
            sleep(self.config.event_backoff()).await;
        }
    }

    /// Handles events in arrival order until the stream ends or errors.
    async fn consume(
        &self,
        mut stream: BoxStream<'static, Result<ContainerEvent, RuntimeError>>,
    ) -> Result<(), RuntimeError> {
        while let Some(msg) = stream.next().await {
            match self.handle_event(&msg?).await {
                Dispatch::Registered(n) => debug!("{} services registered", n),
                Dispatch::Deregistered(n) => debug!("{} services deregistered", n),
                Dispatch::Ignored => {}
            }
        }
        Ok(())
    }

    pub async fn handle_event(&self, event: &ContainerEvent) -> Dispatch {
        if event.kind != "container" || event.container_id.is_empty() {
            return Dispatch::Ignored;
        }
        let Some(action) = EventAction::parse(&event.action) else {
            debug!(
                "Ignoring {} event for {}",
                event.action,
                short_id(&event.container_id)
            );
            return Dispatch::Ignored;
        };

        info!(
            "-> Event: {} [{}]",
            event.action,
            short_id(&event.container_id)
        );
        if action.is_arrival() {
            Dispatch::Registered(self.on_arrival(&event.container_id).await)
        } else {
            Dispatch::Deregistered(self.on_departure(&event.container_id).await)
        }
    }

    async fn on_arrival(&self, container_id: &str) -> usize {
        match self.runtime.get_container(container_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Container {} already gone", short_id(container_id));
                return 0;
            }
            Err(e) => {
                warn!("Failed to inspect container {}: {}", short_id(container_id), e);
                return 0;
            }
        }

        // Network and port metadata can lag the start event.
        sleep(self.config.start_grace()).await;

        let snapshot = match self.runtime.get_container(container_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(
                    "Container {} gone before registration",
                    short_id(container_id)
                );
                return 0;
            }
            Err(e) => {
                warn!("Failed to inspect container {}: {}", short_id(container_id), e);
                return 0;
            }
        };

        debug!("Deriving services of {} ({})", snapshot.name, snapshot.id);
        let mut registered = 0;
        for spec in labels::derive(&snapshot, &self.config) {
            if self.registry.register(&spec).await.is_ok() {
                registered += 1;
            }
        }
        registered
    }

    async fn on_departure(&self, container_id: &str) -> usize {
        let short = match self.runtime.get_container(container_id).await {
            Ok(Some(snapshot)) => snapshot.short_id,
            Ok(None) => short_id(container_id).to_string(),
            Err(e) => {
                debug!("Lookup of departed container failed: {}", e);
                short_id(container_id).to_string()
            }
        };

        let entries = match self.registry.list_all().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to clean up services of container {}: {}", short, e);
                return 0;
            }
        };

        let suffix = format!("-{}", short);
        let mut doomed: Vec<&str> = entries
            .keys()
            .filter(|id| id.ends_with(&suffix))
            .map(String::as_str)
            .collect();
        doomed.sort_unstable();

        let mut removed = 0;
        for id in doomed {
            if self.registry.deregister(id).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Cleanup: removed {} services of {}", removed, short);
        }
        removed
    }
}
