//! The live endpoint set and the ownership rules used to prune the
//! registry.

use std::collections::HashSet;

use crate::config::Config;
use crate::types::{Endpoint, RegistryEntry, ServiceSpec, OWNER_TAG_PREFIX};

/// Every `(address, port)` currently backed by a running, enabled
/// container.  Rebuilt from scratch on each resync.
#[derive(Debug, Clone, Default)]
pub struct EndpointSet {
    endpoints: HashSet<Endpoint>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_from_specs<'a>(&mut self, specs: impl IntoIterator<Item = &'a ServiceSpec>) {
        self.endpoints
            .extend(specs.into_iter().map(ServiceSpec::endpoint));
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    /// True when any live endpoint uses `address`, whatever its port.
    pub fn has_address(&self, address: &str) -> bool {
        self.endpoints.iter().any(|ep| ep.address == address)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether this process owns `entry` and may delete it.
    ///
    /// In fixed-address mode an entry is ours iff it carries the fixed
    /// address. In container-address mode it is ours iff its address is
    /// held by some live endpoint; a foreign entry sharing such an
    /// address is treated as ours too. Entries stamped with another
    /// registrar's owner tag are never ours.
    pub fn is_managed(&self, entry: &RegistryEntry, config: &Config) -> bool {
        if owned_by_other(entry, config) {
            return false;
        }
        match config.public_address() {
            Some(fixed) => entry.address == fixed,
            None => self.has_address(&entry.address),
        }
    }

    /// Managed entries whose exact endpoint is no longer live.
    pub fn orphans<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a RegistryEntry>,
        config: &Config,
    ) -> Vec<&'a RegistryEntry> {
        let mut orphans: Vec<_> = entries
            .into_iter()
            .filter(|entry| self.is_managed(entry, config) && !self.contains(&entry.endpoint()))
            .collect();
        orphans.sort_by(|a, b| a.id.cmp(&b.id));
        orphans
    }
}

fn owned_by_other(entry: &RegistryEntry, config: &Config) -> bool {
    entry
        .tags
        .iter()
        .filter_map(|tag| tag.strip_prefix(OWNER_TAG_PREFIX))
        .any(|owner| config.registry_id.as_deref() != Some(owner))
}

impl FromIterator<Endpoint> for EndpointSet {
    fn from_iter<I: IntoIterator<Item = Endpoint>>(iter: I) -> Self {
        Self {
            endpoints: iter.into_iter().collect(),
        }
    }
}
