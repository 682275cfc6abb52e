use crate::error::RuntimeError;
use crate::types::{ContainerEvent, ContainerSnapshot};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod docker;
pub use docker::DockerRuntime;

/// Read-only access to the container host.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Snapshot every running container.
    async fn list_running(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError>;

    /// Inspect one container; `Ok(None)` when it no longer exists.
    async fn get_container(&self, id: &str) -> Result<Option<ContainerSnapshot>, RuntimeError>;

    /// Subscribe to lifecycle events. The stream ends or yields an error
    /// when the connection drops; callers resubscribe by calling again.
    fn events(&self) -> BoxStream<'static, Result<ContainerEvent, RuntimeError>>;
}
