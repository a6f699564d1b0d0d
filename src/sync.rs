//! Event-driven reconciliation between running containers and proxy routes.
//!
//! Reconciliation is fully sequential: the only suspension points are
//! waiting for the next event line and awaiting podman subprocesses, so no
//! two table mutations ever overlap and events are applied strictly in
//! arrival order. Ordering matters: a start immediately followed by a
//! died for the same container must leave the hostname drained.

use crate::config::Settings;
use crate::event::{parse_event, EventKind};
use crate::nginx::{ConfigPublisher, ConfigSnapshot};
use crate::podman::{ContainerDetails, PodmanClient};
use crate::resolve::resolve;
use crate::routes::{BackendConfig, RoutingTable};
use anyhow::Context;
use tracing::{debug, info, warn};

/// Owns the routing table and drives it from the container runtime:
/// a full sync over the running containers first, then the live event
/// stream until it closes or the process is told to stop.
pub struct Reconciler {
    client: PodmanClient,
    settings: Settings,
    table: RoutingTable,
    publisher: ConfigPublisher,
}

impl Reconciler {
    pub fn new(client: PodmanClient, settings: Settings) -> Self {
        let publisher = ConfigPublisher::new(client.clone(), &settings);
        Self {
            client,
            settings,
            table: RoutingTable::new(),
            publisher,
        }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        self.seed_existing().await?;

        let mut events = self.client.events()?;
        info!("listening for container lifecycle events");

        tokio::pin! {
            let shutdown = shutdown_signal();
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping");
                    events.shutdown().await;
                    return Ok(());
                }
                line = events.next_line() => match line? {
                    Some(line) => self.handle_line(&line).await,
                    None => {
                        // without events the routes go permanently stale
                        anyhow::bail!(
                            "podman event stream closed unexpectedly; restart to resume syncing"
                        );
                    }
                },
            }
        }
    }

    /// Seed routes from the containers already running, then publish once.
    async fn seed_existing(&mut self) -> anyhow::Result<()> {
        let containers = self
            .client
            .list_running()
            .await
            .context("listing running containers")?;
        info!(count = containers.len(), "seeding routes from running containers");

        for container in containers {
            match self.client.inspect(&container).await {
                Ok(Some(details)) => {
                    let name = details.name.clone();
                    self.apply(&name, Some(details));
                }
                Ok(None) => debug!(container, "container gone before it could be inspected"),
                Err(e) => warn!(container, error = %e, "inspect failed, skipping container"),
            }
        }

        let snapshot = ConfigSnapshot::from_table(&self.table);
        self.publisher
            .publish(&snapshot)
            .await
            .context("publishing initial proxy configuration")
    }

    /// Process one raw event line. Discards are logged and publish
    /// nothing; processed events publish unconditionally, one reload per
    /// event.
    async fn handle_line(&mut self, line: &str) {
        let Some(event) = parse_event(line) else {
            debug!(line, "ignoring event");
            return;
        };

        match event.kind {
            EventKind::Died => self.apply(&event.container_name, None),
            EventKind::Start => match self.client.inspect(&event.container_name).await {
                Ok(details) => {
                    if details.is_none() {
                        info!(
                            container = %event.container_name,
                            "started container no longer exists, draining instead"
                        );
                    }
                    self.apply(&event.container_name, details);
                }
                Err(e) => {
                    warn!(
                        container = %event.container_name,
                        error = %e,
                        "inspect failed, leaving routes untouched"
                    );
                    return;
                }
            },
        }

        if let Err(e) = self.publish().await {
            warn!(error = %e, "failed to publish updated proxy configuration");
        }
    }

    /// Fold one container observation into the routing table. `None`
    /// metadata means the container is gone and its claim is drained.
    /// All failure paths are no-ops with a log line; nothing propagates.
    pub fn apply(&mut self, container_name: &str, details: Option<ContainerDetails>) {
        let Some(details) = details else {
            self.table.drain(container_name);
            return;
        };

        // never proxy the proxy
        if details.name == self.settings.proxy_name {
            debug!(container = %details.name, "skipping the proxy's own container");
            return;
        }

        match resolve(&details, &self.settings.network, &self.settings.host_addr) {
            Ok(upstream) => {
                debug!(
                    container = %details.name,
                    upstream = %upstream.host,
                    port = upstream.port,
                    "container resolved"
                );
                self.table.upsert(BackendConfig {
                    hostname: details.config.hostname.clone(),
                    upstream: upstream.host,
                    port: upstream.port,
                    container_name: details.name.clone(),
                    status: details.state.status.clone(),
                });
            }
            Err(reason) => {
                info!(container = %details.name, %reason, "container is unroutable");
            }
        }
    }

    async fn publish(&self) -> anyhow::Result<()> {
        let snapshot = ConfigSnapshot::from_table(&self.table);
        self.publisher.publish(&snapshot).await
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
    }
}
