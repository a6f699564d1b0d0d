//! Rendering and publishing of the nginx virtual-host configuration.

use crate::config::Settings;
use crate::podman::PodmanClient;
use crate::routes::RoutingTable;
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// One virtual host the proxy serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub hostname: String,
    /// URL the virtual host proxies to; always the hostname's upstream
    /// block, so nginx resolves it through its own upstream table.
    pub proxy_pass: String,
}

/// Point-in-time view of the routing table in the shape the renderer
/// needs: virtual hosts plus one `host:port` upstream target per hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub vhosts: Vec<VirtualHost>,
    pub upstreams: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    pub fn from_table(table: &RoutingTable) -> Self {
        let mut vhosts = Vec::with_capacity(table.len());
        let mut upstreams = BTreeMap::new();

        for backend in table.backends() {
            vhosts.push(VirtualHost {
                hostname: backend.hostname.clone(),
                proxy_pass: format!("http://{}", backend.hostname),
            });
            upstreams.insert(
                backend.hostname.clone(),
                format!("{}:{}", backend.upstream, backend.port),
            );
        }

        Self { vhosts, upstreams }
    }
}

/// Render the snapshot as nginx configuration text: one `upstream` block
/// per target, one `server` block per virtual host, in hostname order.
pub fn render(snapshot: &ConfigSnapshot) -> String {
    let mut out = String::from("# generated by podgate; manual edits will be overwritten\n");

    for (hostname, target) in &snapshot.upstreams {
        out.push_str(&format!(
            "\nupstream {hostname} {{\n    server {target};\n}}\n"
        ));
    }

    for vhost in &snapshot.vhosts {
        out.push_str(&format!(
            "\nserver {{\n    listen 80;\n    server_name {};\n\n    location / {{\n        proxy_pass {};\n    }}\n}}\n",
            vhost.hostname, vhost.proxy_pass
        ));
    }

    out
}

/// Writes rendered configuration to disk and hot-reloads the proxy.
#[derive(Debug, Clone)]
pub struct ConfigPublisher {
    client: PodmanClient,
    config_file: PathBuf,
    proxy_name: String,
}

impl ConfigPublisher {
    pub fn new(client: PodmanClient, settings: &Settings) -> Self {
        Self {
            client,
            config_file: settings.config_file(),
            proxy_name: settings.proxy_name.clone(),
        }
    }

    /// Write the rendered snapshot and reload nginx without downtime.
    pub async fn publish(&self, snapshot: &ConfigSnapshot) -> anyhow::Result<()> {
        let rendered = render(snapshot);
        tokio::fs::write(&self.config_file, rendered)
            .await
            .with_context(|| format!("writing {}", self.config_file.display()))?;
        debug!(path = %self.config_file.display(), "proxy configuration written");

        self.client
            .exec(&self.proxy_name, &["nginx", "-s", "reload"])
            .await
            .context("reloading nginx")?;
        info!(vhosts = snapshot.vhosts.len(), "nginx configuration reloaded");
        Ok(())
    }
}
