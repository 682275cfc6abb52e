//! Registrar daemon entry point.
//!
//! Keeps a Consul-style service registry in step with the labelled
//! containers running on this Docker host.

use std::sync::Arc;

use log::info;

mod config;
mod dispatcher;
mod endpoints;
mod error;
mod labels;
mod reconciler;
mod registry;
mod runtime;
mod scheduler;
#[cfg(test)]
mod testing;
mod types;

use config::Config;
use registry::ConsulRegistry;
use runtime::DockerRuntime;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Arc::new(Config::load()?);
    info!("Starting registrar (Docker -> registry)");
    cfg.log_summary();

    // Both collaborators must be reachable before the first sync
    let docker = DockerRuntime::connect(cfg.runtime_endpoint.as_deref(), cfg.request_timeout())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Docker: {}", e))?;

    let consul = ConsulRegistry::new(&cfg.registry_url, cfg.request_timeout())?;
    consul
        .check_leader()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to reach registry {}: {}", cfg.registry_url, e))?;

    Scheduler::new(Arc::new(docker), Arc::new(consul), cfg)
        .run()
        .await
}
