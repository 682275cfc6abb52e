use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use super::Registry;
use crate::config::Config;
use crate::error::RegistryError;
use crate::types::{RegistryEntry, ServiceSpec, OWNER_TAG_PREFIX};

/// Registry access with the write policy applied: single-attempt
/// registration, bounded retries for deregistration, and the optional
/// ownership tag appended to every record.
#[derive(Clone)]
pub struct RegistrationClient {
    registry: Arc<dyn Registry>,
    retries: u32,
    retry_delay: Duration,
    owner_tag: Option<String>,
}

impl RegistrationClient {
    pub fn new(registry: Arc<dyn Registry>, config: &Config) -> Self {
        Self {
            registry,
            retries: config.deregister_retries.max(1),
            retry_delay: config.deregister_retry_delay(),
            owner_tag: config
                .registry_id
                .as_ref()
                .map(|id| format!("{}{}", OWNER_TAG_PREFIX, id)),
        }
    }

    pub async fn register(&self, spec: &ServiceSpec) -> Result<(), RegistryError> {
        let result = match &self.owner_tag {
            Some(tag) if !spec.tags.contains(tag) => {
                let mut tagged = spec.clone();
                tagged.tags.push(tag.clone());
                self.registry.put(&tagged).await
            }
            _ => self.registry.put(spec).await,
        };

        match &result {
            Ok(()) => info!(
                "Registered {} ({}:{}) [{}]",
                spec.name, spec.address, spec.port, spec.id
            ),
            Err(e) => error!("Failed to register {}: {}", spec.id, e),
        }
        result
    }

    /// Attempts deregistration up to the configured number of times,
    /// sleeping between attempts. Only the last failure is returned.
    pub async fn deregister(&self, service_id: &str) -> Result<(), RegistryError> {
        let mut attempt = 1;
        loop {
            match self.registry.delete(service_id).await {
                Ok(()) => {
                    info!("Deregistered {}", service_id);
                    return Ok(());
                }
                Err(e) if attempt < self.retries => {
                    warn!(
                        "Deregister attempt {}/{} failed for {}: {}",
                        attempt, self.retries, service_id, e
                    );
                    sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Giving up on deregistering {}: {}", service_id, e);
                    return Err(e);
                }
            }
        }
    }

    pub async fn list_all(&self) -> Result<HashMap<String, RegistryEntry>, RegistryError> {
        self.registry.list_all().await
    }
}
