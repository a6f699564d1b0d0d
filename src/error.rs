//! Error types for podman CLI invocations.

use std::process::ExitStatus;
use thiserror::Error;

/// Failure modes of a podman subprocess call.
///
/// Per-container problems ("no such container") are not errors at this
/// layer; the adapter reports those as `None` so reconciliation can treat
/// them as a drain. These variants cover the invocation itself going wrong.
#[derive(Debug, Error)]
pub enum PodmanError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("`{command}` produced invalid JSON: {source}")]
    InvalidJson {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("reading event stream: {0}")]
    EventStream(#[source] std::io::Error),
}
