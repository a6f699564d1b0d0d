use std::path::PathBuf;
use thiserror::Error;

/// Name of the nginx container podgate manages.
pub const PROXY_NAME: &str = "podgate-nginx";

/// Private network shared by the proxy and alias-routed containers.
pub const PROXY_NETWORK: &str = "podgate";

/// Image the proxy container is created from. Fully qualified so podman
/// never falls back to interactive short-name resolution.
pub const PROXY_IMAGE: &str = "docker.io/library/nginx:latest";

/// Host port the proxy publishes unless overridden on the command line.
pub const DEFAULT_PROXY_PORT: u16 = 80;

/// Directory the rendered nginx configuration lives in, mounted into the
/// proxy container at /etc/nginx/conf.d.
pub const CONFIG_DIR: &str = "nginx";

pub const USAGE: &str = "usage: podgate <host-address> [<proxy-port>]";

/// Runtime settings, built from the two positional CLI arguments plus
/// compiled-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address containers with host-published ports are reached on.
    pub host_addr: String,
    /// Host port the proxy container publishes.
    pub proxy_port: u16,
    pub proxy_name: String,
    pub network: String,
    pub config_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("missing required <host-address> argument")]
    MissingHostAddr,
    #[error("invalid proxy port '{0}'")]
    InvalidPort(String),
}

impl Settings {
    /// Build settings from positional arguments: host address (required)
    /// and proxy port (optional, default 80).
    pub fn from_args<I>(mut args: I) -> Result<Self, ArgsError>
    where
        I: Iterator<Item = String>,
    {
        let host_addr = args.next().ok_or(ArgsError::MissingHostAddr)?;

        let proxy_port = match args.next() {
            Some(raw) => raw.parse().map_err(|_| ArgsError::InvalidPort(raw))?,
            None => DEFAULT_PROXY_PORT,
        };

        Ok(Self {
            host_addr,
            proxy_port,
            proxy_name: PROXY_NAME.to_string(),
            network: PROXY_NETWORK.to_string(),
            config_dir: PathBuf::from(CONFIG_DIR),
        })
    }

    /// Path the rendered nginx configuration is written to.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("default.conf")
    }
}
