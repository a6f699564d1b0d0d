//! One-time setup of the proxy network and the nginx runtime container.
//!
//! Everything here is on the fatal path: no proxy container means no
//! service, so failures terminate startup with a descriptive message
//! instead of being logged and skipped.

use crate::config::{Settings, PROXY_IMAGE};
use crate::error::PodmanError;
use crate::podman::PodmanClient;
use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

/// Make sure the nginx proxy container exists and is running, creating
/// the private network and the container on first launch.
pub async fn ensure_proxy(client: &PodmanClient, settings: &Settings) -> Result<()> {
    match client.inspect(&settings.proxy_name).await? {
        Some(details) => {
            info!(
                container = %settings.proxy_name,
                status = %details.state.status,
                "proxy container already exists"
            );
            if details.state.status != "running" {
                client
                    .start_container(&settings.proxy_name)
                    .await
                    .context("could not start existing proxy container")?;
                info!(container = %settings.proxy_name, "started proxy container");
            }
        }
        None => create_proxy(client, settings).await?,
    }

    let details = client
        .inspect(&settings.proxy_name)
        .await?
        .ok_or_else(|| anyhow!("proxy container {} vanished during startup", settings.proxy_name))?;

    match details.published_host_ports().first() {
        Some(port) => info!(port, "proxy is listening"),
        None => warn!(container = %settings.proxy_name, "proxy container publishes no port"),
    }

    Ok(())
}

/// Create the proxy network if it does not exist yet.
pub async fn ensure_network(client: &PodmanClient, network: &str) -> Result<()> {
    if client.network_exists(network).await? {
        debug!(network, "proxy network already exists");
        return Ok(());
    }

    client
        .create_network(network)
        .await
        .context("unable to create the proxy network")?;
    info!(network, "created proxy network");
    Ok(())
}

async fn create_proxy(client: &PodmanClient, settings: &Settings) -> Result<()> {
    ensure_network(client, &settings.network).await?;

    tokio::fs::create_dir_all(&settings.config_dir)
        .await
        .with_context(|| format!("creating {}", settings.config_dir.display()))?;
    // podman needs an absolute path for the bind mount
    let config_dir = std::fs::canonicalize(&settings.config_dir)
        .with_context(|| format!("resolving {}", settings.config_dir.display()))?;

    let volume = format!("{}:/etc/nginx/conf.d", config_dir.display());
    let publish = format!("{}:80", settings.proxy_port);

    info!(
        container = %settings.proxy_name,
        port = settings.proxy_port,
        "creating proxy container"
    );

    let result = client
        .run_container(&[
            "-d",
            "--rm",
            "--name",
            &settings.proxy_name,
            "-p",
            &publish,
            "-v",
            &volume,
            PROXY_IMAGE,
        ])
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(PodmanError::CommandFailed { stderr, .. })
            if stderr.contains(&format!("cannot expose privileged port {}", settings.proxy_port)) =>
        {
            warn!(
                port = settings.proxy_port,
                "cannot expose privileged port, retrying with a runtime-assigned host port"
            );

            if let Err(e) = client.remove_container(&settings.proxy_name).await {
                debug!(error = %e, "nothing to remove after failed creation");
            }

            client
                .run_container(&[
                    "-d",
                    "--name",
                    &settings.proxy_name,
                    "-p",
                    "80",
                    "-v",
                    &volume,
                    "--net",
                    &settings.network,
                    PROXY_IMAGE,
                ])
                .await
                .context("unable to start proxy container on a fallback port")?;
            Ok(())
        }
        Err(e) => Err(e).context("unable to start proxy container"),
    }
}
