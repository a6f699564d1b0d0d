//! The in-memory routing table the reconciliation loop maintains.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// The routing decision for one hostname at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Routing key: the container's internal hostname.
    pub hostname: String,
    /// Address the proxy forwards this hostname's traffic to.
    pub upstream: String,
    pub port: u16,
    /// Container whose resolution produced this config.
    pub container_name: String,
    pub status: String,
}

/// Hostname → backend state for every routable container.
///
/// Three structures are kept in lockstep:
/// - `backends`: hostname to the active backend config;
/// - `container_hostname`: container name back to the hostname it claims
///   (died events arrive keyed by container name, not hostname);
/// - `claimants`: all container names currently claiming a hostname, so a
///   route survives rolling restarts where instances overlap.
///
/// A hostname has a backend entry exactly as long as at least one
/// container claims it.
#[derive(Debug, Default)]
pub struct RoutingTable {
    backends: BTreeMap<String, BackendConfig>,
    container_hostname: HashMap<String, String>,
    claimants: HashMap<String, HashSet<String>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the route for `config.hostname`.
    ///
    /// Last write wins: a newer resolution for the same hostname replaces
    /// the config wholesale, whichever container produced the old one.
    /// Re-applying the same resolution is a no-op.
    pub fn upsert(&mut self, config: BackendConfig) {
        let hostname = config.hostname.clone();
        let container = config.container_name.clone();
        let replaced = self.backends.insert(hostname.clone(), config).is_some();
        self.container_hostname
            .insert(container.clone(), hostname.clone());
        self.claimants
            .entry(hostname.clone())
            .or_default()
            .insert(container.clone());
        info!(hostname, container, replaced, "backend route updated");
    }

    /// Drop `container`'s claim on its hostname.
    ///
    /// The route itself is removed only once the last claiming container
    /// is gone. Until then the surviving config is left untouched; even
    /// if it points at the instance that just died, it stays in place
    /// until the next successful resolution overwrites it.
    pub fn drain(&mut self, container: &str) {
        let Some(hostname) = self.container_hostname.remove(container) else {
            debug!(container, "no route associated with container");
            return;
        };

        let remaining = match self.claimants.get_mut(&hostname) {
            Some(set) => {
                set.remove(container);
                set.len()
            }
            None => 0,
        };

        if remaining == 0 {
            self.claimants.remove(&hostname);
            self.backends.remove(&hostname);
            info!(hostname, container, "last container for hostname stopped, route removed");
        } else {
            info!(
                hostname,
                container, remaining, "other containers still claim hostname, route kept"
            );
        }
    }

    pub fn backend(&self, hostname: &str) -> Option<&BackendConfig> {
        self.backends.get(hostname)
    }

    pub fn hostname_for(&self, container: &str) -> Option<&str> {
        self.container_hostname.get(container).map(String::as_str)
    }

    pub fn claimant_count(&self, hostname: &str) -> usize {
        self.claimants.get(hostname).map_or(0, HashSet::len)
    }

    /// Active backends in hostname order.
    pub fn backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.values()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
