//! Podgate - keeps an nginx reverse proxy in sync with podman containers
//!
//! This library watches the podman lifecycle-event stream and:
//! - Seeds routes from the containers already running at startup
//! - Turns container start/died events into routing table updates
//! - Resolves each container to an upstream address, preferring
//!   host-published ports and falling back to network aliases
//! - Renders an nginx virtual-host configuration and hot-reloads the proxy
//! - Bootstraps the proxy's own nginx container and private network

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod event;
pub mod nginx;
pub mod podman;
pub mod resolve;
pub mod routes;
pub mod sync;
