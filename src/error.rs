use thiserror::Error;

/// Failures talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

/// Failures talking to the service registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("invalid registry url {0}")]
    InvalidUrl(String),
}
