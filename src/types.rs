//! Data structures shared by the parser, the reconciler and the event
//! dispatcher.
//!
//! Container state is captured once per inspection as a
//! [`ContainerSnapshot`] and never mutated afterwards.  Everything the
//! registry should hold is derived from snapshots as [`ServiceSpec`]s,
//! while [`RegistryEntry`] is what the registry reports it currently
//! holds.

use std::collections::BTreeMap;
use std::fmt;

/// Number of leading identifier characters that form a short id.
pub const SHORT_ID_LEN: usize = 12;

/// Tag prefix stamping a registration with the registrar that owns it.
pub const OWNER_TAG_PREFIX: &str = "registrador_id=";

/// Returns the short form of a container identifier.
///
/// Identifiers shorter than [`SHORT_ID_LEN`] are returned unchanged.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Read-only view of a running container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Network name → address assigned on that network.
    pub networks: BTreeMap<String, String>,
    /// `"<port>/<proto>"` → published host ports, in binding order.
    pub ports: BTreeMap<String, Vec<u16>>,
}

#[cfg(test)]
impl ContainerSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            short_id: short_id(&id).to_string(),
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>, address: impl Into<String>) -> Self {
        self.networks.insert(network.into(), address.into());
        self
    }

    pub fn with_port(mut self, key: impl Into<String>, host_ports: Vec<u16>) -> Self {
        self.ports.insert(key.into(), host_ports);
        self
    }
}

/// A service record this process wants the registry to hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceSpec {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl ServiceSpec {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }
}

/// A service record as currently held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl RegistryEntry {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }
}

/// An `(address, port)` pair identifying a live service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Container lifecycle actions the dispatcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Start,
    Update,
    Stop,
    Die,
    Destroy,
}

impl EventAction {
    /// Maps a runtime action string, returning `None` for actions that
    /// carry no registration meaning (`exec_start`, `health_status`, ...).
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "update" => Some(Self::Update),
            "stop" => Some(Self::Stop),
            "die" => Some(Self::Die),
            "destroy" => Some(Self::Destroy),
            _ => None,
        }
    }

    pub fn is_arrival(self) -> bool {
        matches!(self, Self::Start | Self::Update)
    }
}

/// A raw lifecycle event from the runtime's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// Object type the event is about (`container`, `network`, ...).
    pub kind: String,
    pub action: String,
    pub container_id: String,
}

#[cfg(test)]
impl ContainerEvent {
    pub fn container(action: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            kind: "container".into(),
            action: action.into(),
            container_id: container_id.into(),
        }
    }
}
