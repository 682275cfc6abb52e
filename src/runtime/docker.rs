use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::types::{short_id, ContainerEvent, ContainerSnapshot};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerInspectResponse, EndpointSettings, PortBinding};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the daemon at `endpoint`, or the local socket when
    /// `None`, and checks it answers.
    pub async fn connect(endpoint: Option<&str>, timeout: Duration) -> Result<Self, RuntimeError> {
        let docker = match endpoint {
            Some(addr) => {
                let docker =
                    Docker::connect_with_http(addr, timeout.as_secs(), API_DEFAULT_VERSION)?;
                info!("Connecting to Docker over HTTP: {}", addr);
                docker
            }
            None => {
                let docker = Docker::connect_with_local_defaults()?.with_timeout(timeout);
                info!("Connecting to Docker via local socket");
                docker
            }
        };

        docker.ping().await?;
        Ok(Self { docker })
    }

    async fn inspect(&self, id: &str) -> Result<Option<ContainerSnapshot>, RuntimeError> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(detail) => Ok(Some(snapshot_from_inspect(detail))),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        let mut snapshots = Vec::with_capacity(containers.len());
        for id in containers.into_iter().filter_map(|c| c.id) {
            match self.inspect(&id).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => debug!("Container {} exited before inspection", short_id(&id)),
                Err(e) => warn!("Failed to inspect container {}: {}", short_id(&id), e),
            }
        }
        Ok(snapshots)
    }

    async fn get_container(&self, id: &str) -> Result<Option<ContainerSnapshot>, RuntimeError> {
        self.inspect(id).await
    }

    fn events(&self) -> BoxStream<'static, Result<ContainerEvent, RuntimeError>> {
        let opts = EventsOptions::<String> {
            filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
            ..Default::default()
        };

        self.docker
            .events(Some(opts))
            .map(|msg| -> Result<ContainerEvent, RuntimeError> {
                let event = msg?;
                let container_id = event
                    .actor
                    .and_then(|actor| actor.id)
                    .unwrap_or_default();
                Ok(ContainerEvent {
                    kind: event.typ.map(|t| t.to_string()).unwrap_or_default(),
                    action: event.action.unwrap_or_default(),
                    container_id,
                })
            })
            .boxed()
    }
}

fn snapshot_from_inspect(detail: ContainerInspectResponse) -> ContainerSnapshot {
    let id = detail.id.unwrap_or_default();
    let name = detail
        .name
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| short_id(&id).to_string());

    let labels: BTreeMap<String, String> = detail
        .config
        .and_then(|c| c.labels)
        .map(|labels| labels.into_iter().collect())
        .unwrap_or_default();

    let settings = detail.network_settings.unwrap_or_default();
    let networks: BTreeMap<String, String> = settings
        .networks
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, net)| network_address(&net).map(|ip| (name, ip)))
        .collect();
    let ports: BTreeMap<String, Vec<u16>> = settings
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|(key, bindings)| (key, host_ports(bindings.unwrap_or_default())))
        .collect();

    ContainerSnapshot {
        short_id: short_id(&id).to_string(),
        id,
        name,
        labels,
        networks,
        ports,
    }
}

fn network_address(net: &EndpointSettings) -> Option<String> {
    [&net.ip_address, &net.global_ipv6_address]
        .into_iter()
        .flatten()
        .find(|ip| !ip.is_empty())
        .cloned()
}

fn host_ports(bindings: Vec<PortBinding>) -> Vec<u16> {
    bindings
        .into_iter()
        .filter_map(|b| b.host_port)
        .filter_map(|p| p.parse().ok())
        .collect()
}
