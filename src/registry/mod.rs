//! Service registry collaborator.
//!
//! [`Registry`] is the raw transport: one attempt per call, no policy.
//! [`RegistrationClient`] layers the retry and tagging rules on top and
//! is what the reconciler and dispatcher use.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::types::{RegistryEntry, ServiceSpec};

pub mod client;
pub mod consul;

pub use client::RegistrationClient;
pub use consul::ConsulRegistry;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Upserts a service record.
    async fn put(&self, spec: &ServiceSpec) -> Result<(), RegistryError>;

    async fn delete(&self, service_id: &str) -> Result<(), RegistryError>;

    /// Every record currently held, keyed by service id.
    async fn list_all(&self) -> Result<HashMap<String, RegistryEntry>, RegistryError>;
}
