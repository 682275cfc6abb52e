use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest accepted resync interval, in seconds.
pub const MIN_RESYNC_INTERVAL: u64 = 10;

/// Where a service's registered address comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// First address the container holds on any of its networks.
    Container,
    /// The configured `fixed_address`, verbatim.
    #[serde(alias = "public", alias = "host")]
    Fixed,
}

/// Which port is registered for a declared service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// The port named in the routing label.
    Container,
    /// The host port the declared port is published on.
    Host,
}

/// Whether the `loadbalancer.server.port` label is advertised as a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortTagPolicy {
    /// Include in container-port mode, omit in host-port mode.
    Auto,
    Include,
    Omit,
}

/// Which `traefik.*` labels become tags of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
    /// Every `traefik.*` label of the container.
    All,
    /// Global labels plus the service's own `services`/`routers` labels.
    Service,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub address_mode: AddressMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_address: Option<String>,
    pub port_mode: PortMode,
    pub port_tag: PortTagPolicy,
    pub tag_scope: TagScope,
    pub registry_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_endpoint: Option<String>,
    /// Seconds between full resyncs.
    pub resync_interval: u64,
    pub deregister_retries: u32,
    /// Seconds between deregistration attempts.
    pub deregister_retry_delay: u64,
    /// Per-call timeout for collaborator requests, in seconds.
    pub request_timeout: u64,
    /// Grace period before handling a start event, in milliseconds.
    pub start_grace: u64,
    /// Seconds to wait before resubscribing to the event stream.
    pub event_backoff: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address_mode: AddressMode::Container,
            fixed_address: None,
            port_mode: PortMode::Host,
            port_tag: PortTagPolicy::Auto,
            tag_scope: TagScope::All,
            registry_url: "http://consul:8500".into(),
            registry_id: None,
            runtime_endpoint: None,
            resync_interval: 60,
            deregister_retries: 3,
            deregister_retry_delay: 2,
            request_timeout: 5,
            start_grace: 1000,
            event_backoff: 5,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("registrar.toml"))
                .merge(Json::file("registrar.json"))
                .merge(Env::prefixed("REGISTRAR_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()
    }

    fn validate(mut self) -> anyhow::Result<Self> {
        self.fixed_address = self
            .fixed_address
            .take()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        if self.address_mode == AddressMode::Fixed && self.fixed_address.is_none() {
            anyhow::bail!("address_mode=fixed requires fixed_address to be set");
        }

        if self.resync_interval < MIN_RESYNC_INTERVAL {
            warn!(
                "resync_interval too low ({}s), using {}s",
                self.resync_interval, MIN_RESYNC_INTERVAL
            );
            self.resync_interval = MIN_RESYNC_INTERVAL;
        }

        if self.deregister_retries == 0 {
            warn!("deregister_retries must be at least 1, using 1");
            self.deregister_retries = 1;
        }

        self.registry_url = self.registry_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// The fixed address, when operating in fixed-address mode.
    pub fn public_address(&self) -> Option<&str> {
        match self.address_mode {
            AddressMode::Fixed => self.fixed_address.as_deref(),
            AddressMode::Container => None,
        }
    }

    /// Resolves the port-tag policy against the port mode.
    pub fn include_port_tag(&self) -> bool {
        match self.port_tag {
            PortTagPolicy::Auto => self.port_mode == PortMode::Container,
            PortTagPolicy::Include => true,
            PortTagPolicy::Omit => false,
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval)
    }

    pub fn deregister_retry_delay(&self) -> Duration {
        Duration::from_secs(self.deregister_retry_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace)
    }

    pub fn event_backoff(&self) -> Duration {
        Duration::from_secs(self.event_backoff)
    }

    /// Logs the effective configuration, one knob per line.
    pub fn log_summary(&self) {
        info!("Configuration:");
        match self.public_address() {
            Some(ip) => info!("  Address: fixed {}", ip),
            None => info!("  Address: container (dynamic)"),
        }
        match self.port_mode {
            PortMode::Host => info!("  Port: host (published)"),
            PortMode::Container => info!("  Port: container (from label)"),
        }
        info!(
            "  Port label tag: {}",
            if self.include_port_tag() { "included" } else { "omitted" }
        );
        info!("  Tag scope: {:?}", self.tag_scope);
        info!("  Registry: {}", self.registry_url);
        if let Some(id) = &self.registry_id {
            info!("  Registrar ID: {}", id);
        }
        match &self.runtime_endpoint {
            Some(endpoint) => info!("  Docker: {}", endpoint),
            None => info!("  Docker: local socket"),
        }
        info!("  Resync: {}s", self.resync_interval);
        info!(
            "  Deregister retry: {}x (delay {}s)",
            self.deregister_retries, self.deregister_retry_delay
        );
    }
}
