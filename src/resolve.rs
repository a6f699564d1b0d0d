//! Upstream address resolution for a single container.
//!
//! Host-published ports are reachable directly from the host network
//! namespace, so they win and the upstream is the configured host address.
//! Containers with internal ports only must be reached over the shared
//! proxy network, through one of the DNS aliases the runtime assigned
//! there. Preferring the alias that equals the container's hostname
//! keeps the route stable across restarts.

use crate::podman::ContainerDetails;
use thiserror::Error;

/// Address and port the proxy should forward a hostname's traffic to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

/// Why a running container gets no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unroutable {
    #[error("no published or declared ports")]
    NoPorts,
    #[error("declared ports only and not attached to the proxy network")]
    NotOnProxyNetwork,
    #[error("attached to the proxy network but no aliases assigned")]
    NoAliases,
}

/// Compute the upstream for a container, or a reason it cannot be routed.
pub fn resolve(
    details: &ContainerDetails,
    proxy_network: &str,
    host_addr: &str,
) -> Result<Upstream, Unroutable> {
    let published = details.published_host_ports();
    if let Some(port) = published.first() {
        return Ok(Upstream {
            host: host_addr.to_string(),
            port: *port,
        });
    }

    let declared = details.declared_ports();
    let Some(port) = declared.first() else {
        return Err(Unroutable::NoPorts);
    };

    let aliases = details
        .aliases_on(proxy_network)
        .ok_or(Unroutable::NotOnProxyNetwork)?;

    let host = alias_upstream(aliases, details.hostname(), &details.id)
        .ok_or(Unroutable::NoAliases)?;

    Ok(Upstream {
        host,
        port: *port,
    })
}

/// Pick the alias to route through: the container's own hostname if it is
/// among the aliases, else an alias contained in the runtime id, else the
/// first alias in declared order.
fn alias_upstream(aliases: &[String], hostname: &str, id: &str) -> Option<String> {
    if aliases.iter().any(|alias| alias == hostname) {
        return Some(hostname.to_string());
    }

    if let Some(alias) = aliases.iter().find(|alias| id.contains(alias.as_str())) {
        return Some(alias.clone());
    }

    aliases.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::podman::{
        ContainerConfigSection, ContainerState, NetworkAttachment, NetworkSettings, PortBinding,
    };
    use std::collections::BTreeMap;

    const NETWORK: &str = "podgate";
    const HOST_ADDR: &str = "10.0.0.5";

    fn details(
        id: &str,
        name: &str,
        hostname: &str,
        ports: BTreeMap<String, Option<Vec<PortBinding>>>,
        networks: BTreeMap<String, NetworkAttachment>,
    ) -> ContainerDetails {
        ContainerDetails {
            id: id.to_string(),
            name: name.to_string(),
            config: ContainerConfigSection {
                hostname: hostname.to_string(),
            },
            state: ContainerState {
                status: "running".to_string(),
            },
            network_settings: NetworkSettings { ports, networks },
        }
    }

    fn published(container_port: &str, host_port: &str) -> BTreeMap<String, Option<Vec<PortBinding>>> {
        BTreeMap::from([(
            container_port.to_string(),
            Some(vec![PortBinding {
                host_port: host_port.to_string(),
            }]),
        )])
    }

    fn declared(container_port: &str) -> BTreeMap<String, Option<Vec<PortBinding>>> {
        BTreeMap::from([(container_port.to_string(), None)])
    }

    fn attached(aliases: &[&str]) -> BTreeMap<String, NetworkAttachment> {
        BTreeMap::from([(
            NETWORK.to_string(),
            NetworkAttachment {
                aliases: Some(aliases.iter().map(|a| a.to_string()).collect()),
                network_id: Some(NETWORK.to_string()),
            },
        )])
    }

    #[test]
    fn test_published_port_routes_to_host_address() {
        let details = details(
            "abc123",
            "web1",
            "web1",
            published("80/tcp", "8080"),
            BTreeMap::new(),
        );

        let upstream = resolve(&details, NETWORK, HOST_ADDR).unwrap();
        assert_eq!(upstream.host, HOST_ADDR);
        assert_eq!(upstream.port, 8080);
    }

    #[test]
    fn test_published_port_wins_over_network_aliases() {
        let details = details(
            "abc123",
            "web1",
            "web1",
            published("80/tcp", "8080"),
            attached(&["web1"]),
        );

        let upstream = resolve(&details, NETWORK, HOST_ADDR).unwrap();
        assert_eq!(upstream.host, HOST_ADDR);
    }

    #[test]
    fn test_declared_port_resolves_via_hostname_alias() {
        let details = details(
            "x1y2aa",
            "web2",
            "web2",
            declared("3000/tcp"),
            attached(&["web2", "x1y2"]),
        );

        let upstream = resolve(&details, NETWORK, HOST_ADDR).unwrap();
        assert_eq!(upstream.host, "web2");
        assert_eq!(upstream.port, 3000);
    }

    #[test]
    fn test_alias_matching_runtime_id_substring() {
        let details = details(
            "deadbeefx1y2",
            "web2",
            "something-else",
            declared("3000/tcp"),
            attached(&["web2-alias", "x1y2"]),
        );

        let upstream = resolve(&details, NETWORK, HOST_ADDR).unwrap();
        assert_eq!(upstream.host, "x1y2");
    }

    #[test]
    fn test_first_alias_fallback() {
        let details = details(
            "deadbeef",
            "web2",
            "something-else",
            declared("3000/tcp"),
            attached(&["first", "second"]),
        );

        let upstream = resolve(&details, NETWORK, HOST_ADDR).unwrap();
        assert_eq!(upstream.host, "first");
    }

    #[test]
    fn test_no_ports_at_all() {
        let details = details("abc", "job", "job", BTreeMap::new(), attached(&["job"]));
        assert_eq!(
            resolve(&details, NETWORK, HOST_ADDR),
            Err(Unroutable::NoPorts)
        );
    }

    #[test]
    fn test_null_bindings_count_as_unpublished() {
        let details = details("abc", "job", "job", declared("9000/tcp"), BTreeMap::new());
        assert_eq!(
            resolve(&details, NETWORK, HOST_ADDR),
            Err(Unroutable::NotOnProxyNetwork)
        );
    }

    #[test]
    fn test_attached_elsewhere_is_not_the_proxy_network() {
        let mut details = details("abc", "job", "job", declared("9000/tcp"), BTreeMap::new());
        details.network_settings.networks.insert(
            "bridge".to_string(),
            NetworkAttachment {
                aliases: Some(vec!["job".to_string()]),
                network_id: Some("bridge".to_string()),
            },
        );

        assert_eq!(
            resolve(&details, NETWORK, HOST_ADDR),
            Err(Unroutable::NotOnProxyNetwork)
        );
    }

    #[test]
    fn test_no_aliases_assigned() {
        let details = details("abc", "job", "job", declared("9000/tcp"), attached(&[]));
        assert_eq!(
            resolve(&details, NETWORK, HOST_ADDR),
            Err(Unroutable::NoAliases)
        );
    }
}
