//! Consul agent HTTP API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};

use super::Registry;
use crate::error::RegistryError;
use crate::types::{RegistryEntry, ServiceSpec};

pub struct ConsulRegistry {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
struct ServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags")]
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
    #[serde(rename = "Tags", default)]
    tags: Option<Vec<String>>,
}

impl From<AgentService> for RegistryEntry {
    fn from(svc: AgentService) -> Self {
        Self {
            id: svc.id,
            address: svc.address,
            port: svc.port,
            tags: svc.tags.unwrap_or_default(),
        }
    }
}

impl ConsulRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(timeout).build()?;
        let parsed = Url::parse(base_url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one so
    /// service ids cannot spill into the query or fragment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Fails unless the agent answers and the cluster has a leader.
    pub async fn check_leader(&self) -> Result<(), RegistryError> {
        let resp = self
            .client
            .get(self.url(&["v1", "status", "leader"]))
            .send()
            .await?;
        let leader: String = check(resp, "status/leader").await?.json().await?;
        if leader.is_empty() {
            return Err(RegistryError::Unavailable("no cluster leader".into()));
        }
        info!("Connected to registry {} (leader {})", self.base_url, leader);
        Ok(())
    }
}

async fn check(resp: Response, operation: &'static str) -> Result<Response, RegistryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RegistryError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Registry for ConsulRegistry {
    async fn put(&self, spec: &ServiceSpec) -> Result<(), RegistryError> {
        let body = ServiceRegistration {
            id: &spec.id,
            name: &spec.name,
            address: &spec.address,
            port: spec.port,
            tags: &spec.tags,
        };
        let resp = self
            .client
            .put(self.url(&["v1", "agent", "service", "register"]))
            .json(&body)
            .send()
            .await?;
        check(resp, "register").await?;
        Ok(())
    }

    async fn delete(&self, service_id: &str) -> Result<(), RegistryError> {
        let resp = self
            .client
            .put(self.url(&["v1", "agent", "service", "deregister", service_id]))
            .send()
            .await?;
        check(resp, "deregister").await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<HashMap<String, RegistryEntry>, RegistryError> {
        let resp = self
            .client
            .get(self.url(&["v1", "agent", "services"]))
            .send()
            .await?;
        let services: HashMap<String, AgentService> =
            check(resp, "services").await?.json().await?;
        Ok(services
            .into_iter()
            .map(|(id, svc)| (id, svc.into()))
            .collect())
    }
}
