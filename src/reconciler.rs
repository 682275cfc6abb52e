//! Full resync of the registry against the running containers.
//!
//! A pass runs in two phases, always in this order:
//!
//! 1. Every running container is derived into services, each service is
//!    registered, and the union of all derived endpoints forms the live
//!    [`EndpointSet`].
//! 2. The registry is listed and every managed entry whose endpoint is
//!    not live is deregistered. Entries this process does not manage
//!    are never touched.
//!
//! Registering first means a restarted container's new instance is
//! already live when the sweep runs.

use std::sync::Arc;

use log::{debug, error, info};

use crate::config::Config;
use crate::endpoints::EndpointSet;
use crate::labels;
use crate::registry::RegistrationClient;
use crate::runtime::ContainerRuntime;

/// Outcome counts of one resync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub containers: usize,
    pub registered: usize,
    pub failed: usize,
    pub orphans_removed: usize,
    pub orphans_failed: usize,
    /// False when phase 2 did not run.
    pub pruned: bool,
}

#[derive(Clone)]
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    registry: RegistrationClient,
    config: Arc<Config>,
}

impl Reconciler {
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

    pub async fn sync_all(&self) -> SyncReport {
        info!("=== Starting full resync ===");
        let mut report = SyncReport::default();

        let live = match self.converge(&mut report).await {
            Some(live) => live,
            None => {
                info!("=== Resync aborted: container listing unavailable ===");
                return report;
            }
        };

        self.prune(&live, &mut report).await;

        info!(
            "=== Resync complete: {} containers, {} registered, {} failed, {} orphans removed, {} orphans kept{} ===",
            report.containers,
            report.registered,
            report.failed,
            report.orphans_removed,
            report.orphans_failed,
            if report.pruned { "" } else { " (sweep skipped)" }
        );
        report
    }

    /// Phase 1. Returns `None` when the container list could not be read,
    /// in which case nothing is known to be live and pruning must not run.
    async fn converge(&self, report: &mut SyncReport) -> Option<EndpointSet> {
        let containers = match self.runtime.list_running().await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Failed to list running containers: {}", e);
                return None;
            }
        };
        report.containers = containers.len();
        info!("Found {} running containers", containers.len());

        let mut live = EndpointSet::new();
        for container in &containers {
            let specs = labels::derive(container, &self.config);
            live.extend_from_specs(&specs);
            for spec in &specs {
                match self.registry.register(spec).await {
                    Ok(()) => report.registered += 1,
                    Err(_) => report.failed += 1,
                }
            }
        }
        debug!("{} live endpoints", live.len());
        Some(live)
    }

    /// Phase 2.
    async fn prune(&self, live: &EndpointSet, report: &mut SyncReport) {
        let entries = match self.registry.list_all().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list registry entries, skipping orphan sweep: {}", e);
                return;
            }
        };
        report.pruned = true;

        let orphans = live.orphans(entries.values(), &self.config);
        if orphans.is_empty() {
            info!("No orphaned services found");
            return;
        }

        info!("Found {} orphaned services", orphans.len());
        for orphan in orphans {
            info!("  Orphan: {} ({})", orphan.id, orphan.endpoint());
            match self.registry.deregister(&orphan.id).await {
                Ok(()) => report.orphans_removed += 1,
                Err(_) => report.orphans_failed += 1,
            }
        }
    }
}
