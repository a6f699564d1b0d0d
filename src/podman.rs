//! Thin adapter over the podman CLI.
//!
//! Every interaction with the container runtime goes through this module:
//! listing and inspecting containers, streaming lifecycle events, creating
//! the proxy network and container, and executing commands inside the
//! proxy. Inspect payloads are decoded into the small [`ContainerDetails`]
//! model; everything else podman reports is ignored.

use crate::error::PodmanError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

/// Client for a podman installation reachable on `$PATH`.
#[derive(Debug, Clone)]
pub struct PodmanClient {
    program: String,
}

impl Default for PodmanClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PodmanClient {
    pub fn new() -> Self {
        Self {
            program: "podman".to_string(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, PodmanError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "running podman command");
        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| PodmanError::Spawn { command, source })
    }

    /// Run a command and require a zero exit status.
    async fn run_checked(&self, args: &[&str]) -> Result<Output, PodmanError> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(PodmanError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Ids of all currently running containers (`podman ps -q`).
    pub async fn list_running(&self) -> Result<Vec<String>, PodmanError> {
        let output = self.run_checked(&["ps", "-q"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Inspect a container by name or id. Returns `Ok(None)` when the
    /// container does not exist (nonzero exit or empty result array).
    pub async fn inspect(&self, container: &str) -> Result<Option<ContainerDetails>, PodmanError> {
        debug!(container, "inspecting container");
        let output = self.run(&["inspect", container]).await?;
        if !output.status.success() {
            debug!(container, "inspect reported no such container");
            return Ok(None);
        }

        let mut entries: Vec<ContainerDetails> =
            serde_json::from_slice(&output.stdout).map_err(|source| PodmanError::InvalidJson {
                command: format!("{} inspect {}", self.program, container),
                source,
            })?;

        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(entries.remove(0)))
        }
    }

    /// Execute a command inside a running container.
    pub async fn exec(&self, container: &str, command: &[&str]) -> Result<(), PodmanError> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        self.run_checked(&args).await?;
        Ok(())
    }

    pub async fn network_exists(&self, network: &str) -> Result<bool, PodmanError> {
        let output = self.run(&["network", "exists", network]).await?;
        Ok(output.status.success())
    }

    pub async fn create_network(&self, network: &str) -> Result<(), PodmanError> {
        self.run_checked(&["network", "create", network]).await?;
        Ok(())
    }

    /// `podman run` with caller-supplied arguments (detach flags included
    /// by the caller).
    pub async fn run_container(&self, args: &[&str]) -> Result<(), PodmanError> {
        let mut full = vec!["run"];
        full.extend_from_slice(args);
        self.run_checked(&full).await?;
        Ok(())
    }

    pub async fn start_container(&self, container: &str) -> Result<(), PodmanError> {
        self.run_checked(&["start", container]).await?;
        Ok(())
    }

    pub async fn remove_container(&self, container: &str) -> Result<(), PodmanError> {
        self.run_checked(&["rm", container]).await?;
        Ok(())
    }

    /// Spawn the live `podman events` stream.
    ///
    /// The child is spawned with kill-on-drop, so dropping the returned
    /// stream on any exit path also terminates the subprocess.
    pub fn events(&self) -> Result<EventStream, PodmanError> {
        let command = format!("{} events", self.program);
        debug!(%command, "spawning event stream");
        let mut child = Command::new(&self.program)
            .arg("events")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PodmanError::Spawn { command, source })?;

        let stdout = child.stdout.take().expect("child stdout is piped");
        let lines = BufReader::new(stdout).lines();
        Ok(EventStream { child, lines })
    }
}

/// Live lifecycle-event subprocess. One text line per event, unbounded,
/// not restartable: a new stream starts live with no replay of history.
pub struct EventStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl EventStream {
    /// Next raw event line; `Ok(None)` when the stream has closed.
    pub async fn next_line(&mut self) -> Result<Option<String>, PodmanError> {
        self.lines.next_line().await.map_err(PodmanError::EventStream)
    }

    /// Terminate the subprocess explicitly on a clean shutdown.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "event stream subprocess already gone");
        }
    }
}

/// Subset of `podman inspect` output the reconciler reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub config: ContainerConfigSection,
    pub state: ContainerState,
    #[serde(default)]
    pub network_settings: NetworkSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfigSection {
    /// The container's internal hostname; used as the routing key.
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// Declared container ports, mapped to host bindings when published.
    /// A `null` or absent binding list means the port is declared only.
    #[serde(default)]
    pub ports: BTreeMap<String, Option<Vec<PortBinding>>>,
    /// Per-network attachments, keyed by network name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_port: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkAttachment {
    /// DNS names the container answers to on this network.
    #[serde(default, rename = "Aliases")]
    pub aliases: Option<Vec<String>>,
    #[serde(default, rename = "NetworkID")]
    pub network_id: Option<String>,
}

impl ContainerDetails {
    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// Host-side ports this container publishes, in declared-port order.
    /// Unparsable entries are skipped.
    pub fn published_host_ports(&self) -> Vec<u16> {
        self.network_settings
            .ports
            .values()
            .flatten()
            .flatten()
            .filter_map(|binding| binding.host_port.parse().ok())
            .collect()
    }

    /// Container-side ports declared in the image or at creation,
    /// published or not.
    pub fn declared_ports(&self) -> Vec<u16> {
        self.network_settings
            .ports
            .keys()
            .filter_map(|key| key.split('/').next().and_then(|port| port.parse().ok()))
            .collect()
    }

    /// Aliases assigned on the given network, if attached to it.
    pub fn aliases_on(&self, network: &str) -> Option<&[String]> {
        self.network_settings
            .networks
            .get(network)
            .map(|attachment| attachment.aliases.as_deref().unwrap_or(&[]))
    }
}
