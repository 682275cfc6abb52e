//! Derivation of service definitions from container labels.
//!
//! A container takes part only when it carries `traefik.enable=true`.
//! Each `traefik.http.services.<name>.loadbalancer.server.port=<port>`
//! label declares one service; every declared service resolves its
//! address and port independently, so one unresolvable service never
//! blocks its siblings.  Derivation is pure and never fails: bad input
//! yields fewer services.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::{Config, PortMode, TagScope};
use crate::types::{ContainerSnapshot, ServiceSpec};

const ENABLE_LABEL: &str = "traefik.enable";
const TAG_PREFIX: &str = "traefik.";
const SERVICES_PREFIX: &str = "traefik.http.services.";
const PORT_SUFFIX: &str = ".loadbalancer.server.port";

/// Derives every registrable service of `snapshot`.
///
/// Output is ordered by service name and tags are sorted, so equal
/// inputs always produce equal output.
pub fn derive(snapshot: &ContainerSnapshot, config: &Config) -> Vec<ServiceSpec> {
    if snapshot.labels.get(ENABLE_LABEL).map(String::as_str) != Some("true") {
        return Vec::new();
    }

    let declared = declared_services(snapshot);
    if declared.is_empty() {
        debug!("{}: no services declared", snapshot.name);
        return Vec::new();
    }

    let mut specs = Vec::with_capacity(declared.len());
    for (name, declared_port) in declared {
        let Some(address) = resolve_address(snapshot, config) else {
            warn!(
                "{}/{}: could not resolve an address, skipping",
                snapshot.name, name
            );
            continue;
        };

        let port = match config.port_mode {
            PortMode::Container => declared_port,
            PortMode::Host => match published_port(snapshot, declared_port) {
                Some(port) => port,
                None => {
                    warn!(
                        "{}/{}: port {} is not published on the host, skipping",
                        snapshot.name, name, declared_port
                    );
                    continue;
                }
            },
        };

        debug!(
            "{}/{}: {}:{} (declared {})",
            snapshot.name, name, address, port, declared_port
        );

        specs.push(ServiceSpec {
            id: format!("{}-{}", name, snapshot.short_id),
            tags: build_tags(&snapshot.labels, name, config),
            name: name.to_string(),
            address: address.to_string(),
            port,
        });
    }
    specs
}

/// Collects `<name> → declared port` from the service port labels.
fn declared_services(snapshot: &ContainerSnapshot) -> BTreeMap<&str, u16> {
    let mut services = BTreeMap::new();
    for (key, value) in &snapshot.labels {
        if !key.starts_with(SERVICES_PREFIX) || !key.ends_with(PORT_SUFFIX) {
            continue;
        }
        let Some(name) = key.split('.').nth(3).filter(|n| !n.is_empty()) else {
            continue;
        };
        match value.trim().parse::<u16>() {
            Ok(port) => {
                services.insert(name, port);
            }
            Err(e) => warn!(
                "{}: invalid label {}={} ({})",
                snapshot.name, key, value, e
            ),
        }
    }
    services
}

fn resolve_address<'a>(snapshot: &'a ContainerSnapshot, config: &'a Config) -> Option<&'a str> {
    if let Some(fixed) = config.public_address() {
        return Some(fixed);
    }
    snapshot
        .networks
        .values()
        .map(|addr| addr.trim())
        .find(|addr| !addr.is_empty())
}

/// First host port bound to `<declared>/tcp`; never any other binding.
fn published_port(snapshot: &ContainerSnapshot, declared: u16) -> Option<u16> {
    snapshot
        .ports
        .get(&format!("{}/tcp", declared))
        .and_then(|bindings| bindings.first().copied())
}

fn build_tags(labels: &BTreeMap<String, String>, service: &str, config: &Config) -> Vec<String> {
    let include_port = config.include_port_tag();
    let service_scope = format!(".services.{}.", service);
    let router_scope = format!(".routers.{}.", service);

    labels
        .iter()
        .filter(|(key, _)| key.starts_with(TAG_PREFIX))
        .filter(|(key, _)| match config.tag_scope {
            TagScope::All => true,
            TagScope::Service => {
                let global = !key.contains(".services.") && !key.contains(".routers.");
                global || key.contains(&service_scope) || key.contains(&router_scope)
            }
        })
        .filter(|(key, _)| include_port || !is_port_label(key))
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

fn is_port_label(key: &str) -> bool {
    key.starts_with(SERVICES_PREFIX) && key.ends_with(PORT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AddressMode, PortTagPolicy};

    const ID: &str = "abc123456789ffffeeee";

    fn host_config() -> Config {
        Config {
            address_mode: AddressMode::Container,
            port_mode: PortMode::Host,
            ..Config::default()
        }
    }

    fn container_config() -> Config {
        Config {
            port_mode: PortMode::Container,
            ..Config::default()
        }
    }

    fn web_container() -> ContainerSnapshot {
        ContainerSnapshot::new(ID, "web-1")
            .with_label("traefik.enable", "true")
            .with_label("traefik.http.services.web.loadbalancer.server.port", "80")
            .with_network("bridge", "172.17.0.5")
            .with_port("80/tcp", vec![32000])
    }

    #[test]
    fn host_port_scenario() {
        let specs = derive(&web_container(), &host_config());
        assert_eq!(
            specs,
            vec![ServiceSpec {
                id: "web-abc123456789".into(),
                name: "web".into(),
                address: "172.17.0.5".into(),
                port: 32000,
                tags: vec!["traefik.enable=true".into()],
            }]
        );
    }

    #[test]
    fn disabled_container_yields_nothing() {
        let mut snap = web_container();
        snap.labels.remove("traefik.enable");
        assert!(derive(&snap, &host_config()).is_empty());

        let snap = web_container().with_label("traefik.enable", "false");
        assert!(derive(&snap, &host_config()).is_empty());
    }

    #[test]
    fn no_declared_port_means_no_default_registration() {
        let snap = ContainerSnapshot::new(ID, "plain")
            .with_label("traefik.enable", "true")
            .with_network("bridge", "172.17.0.9")
            .with_port("80/tcp", vec![8080]);
        assert!(derive(&snap, &host_config()).is_empty());
    }

    #[test]
    fn derivation_is_idempotent() {
        let snap = web_container()
            .with_label("traefik.http.routers.web.rule", "Host(`a.example`)")
            .with_label("traefik.http.services.api.loadbalancer.server.port", "9000")
            .with_port("9000/tcp", vec![32001]);
        let cfg = container_config();
        assert_eq!(derive(&snap, &cfg), derive(&snap, &cfg));
    }

    #[test]
    fn service_id_is_name_dash_short_id() {
        let snap = ContainerSnapshot::new("abc123", "x")
            .with_label("traefik.enable", "true")
            .with_label("traefik.http.services.web.loadbalancer.server.port", "80")
            .with_network("bridge", "10.0.0.2");
        let specs = derive(&snap, &container_config());
        assert_eq!(specs[0].id, "web-abc123");
    }

    #[test]
    fn unpublished_host_port_skips_only_that_service() {
        let snap = web_container()
            .with_label("traefik.http.services.admin.loadbalancer.server.port", "8080")
            .with_port("9999/tcp", vec![40000]);
        let specs = derive(&snap, &host_config());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "web");
    }

    #[test]
    fn empty_binding_list_counts_as_unpublished() {
        let snap = web_container().with_port("80/tcp", vec![]);
        assert!(derive(&snap, &host_config()).is_empty());
    }

    #[test]
    fn port_label_tag_follows_port_mode() {
        let port_tag = "traefik.http.services.web.loadbalancer.server.port=80".to_string();

        let specs = derive(&web_container(), &container_config());
        assert_eq!(specs[0].port, 80);
        assert!(specs[0].tags.contains(&port_tag));

        let specs = derive(&web_container(), &host_config());
        assert!(!specs[0].tags.contains(&port_tag));

        let cfg = Config {
            port_tag: PortTagPolicy::Include,
            ..host_config()
        };
        assert!(derive(&web_container(), &cfg)[0].tags.contains(&port_tag));
    }

    #[test]
    fn fixed_address_is_used_verbatim() {
        let cfg = Config {
            address_mode: AddressMode::Fixed,
            fixed_address: Some("203.0.113.10".into()),
            ..host_config()
        };
        let mut snap = web_container();
        snap.networks.clear();
        let specs = derive(&snap, &cfg);
        assert_eq!(specs[0].address, "203.0.113.10");
        assert_eq!(specs[0].port, 32000);
    }

    #[test]
    fn missing_address_skips_service() {
        let mut snap = web_container().with_network("other", "");
        snap.networks.remove("bridge");
        assert!(derive(&snap, &container_config()).is_empty());
    }

    #[test]
    fn first_non_empty_network_address_wins() {
        let snap = web_container()
            .with_network("aaa", "")
            .with_network("zzz", "10.9.9.9");
        let specs = derive(&snap, &container_config());
        assert_eq!(specs[0].address, "172.17.0.5");
    }

    #[test]
    fn malformed_port_labels_are_skipped() {
        let snap = web_container()
            .with_label("traefik.http.services.bad.loadbalancer.server.port", "eighty")
            .with_label("traefik.http.services.huge.loadbalancer.server.port", "70000");
        let specs = derive(&snap, &container_config());
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web"]);
    }

    #[test]
    fn non_traefik_labels_are_not_tags() {
        let snap = web_container()
            .with_label("com.docker.compose.project", "demo")
            .with_label("traefik.http.routers.web.rule", "Host(`a.example`)");
        let tags = &derive(&snap, &host_config())[0].tags;
        assert_eq!(
            tags,
            &vec![
                "traefik.enable=true".to_string(),
                "traefik.http.routers.web.rule=Host(`a.example`)".to_string(),
            ]
        );
    }

    #[test]
    fn service_tag_scope_drops_sibling_labels() {
        let snap = web_container()
            .with_label("traefik.http.services.api.loadbalancer.server.port", "9000")
            .with_label("traefik.http.routers.api.rule", "PathPrefix(`/api`)")
            .with_label("traefik.http.routers.web.rule", "Host(`a.example`)");
        let cfg = Config {
            tag_scope: TagScope::Service,
            ..container_config()
        };
        let specs = derive(&snap, &cfg);
        let web = specs.iter().find(|s| s.name == "web").unwrap();
        assert!(web.tags.contains(&"traefik.http.routers.web.rule=Host(`a.example`)".into()));
        assert!(!web.tags.iter().any(|t| t.contains(".api.")));
        assert!(web.tags.contains(&"traefik.enable=true".into()));
    }
}
