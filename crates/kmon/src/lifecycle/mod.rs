pub mod pod;
pub mod pvc;
pub mod snapshot;
pub mod wait;

use std::time::Duration;

use crate::client::ClientError;

pub use pod::{PodManager, PodOption, PodRequest, VolumeAttachment};
pub use pvc::{PvcManager, PvcOption, PvcRequest};
pub use snapshot::SnapshotRequest;
pub use wait::WaitCondition;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {kind} request: {reason}")]
    InvalidRequest { kind: &'static str, reason: String },

    #[error("failed to {action} {kind} {namespace}/{name}")]
    Client {
        action: &'static str,
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error(
        "timed out after {}s waiting for pod {namespace}/{name} to be {condition}",
        timeout.as_secs()
    )]
    Timeout {
        condition: WaitCondition,
        namespace: String,
        name: String,
        timeout: Duration,
    },

    #[error("watch on pod {namespace}/{name} failed")]
    WatchFailed {
        namespace: String,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("{kind} {namespace}/{name}: cancelled")]
    Cancelled {
        kind: &'static str,
        namespace: String,
        name: String,
    },
}

impl Error {
    /// The facade error underneath, if the cluster rejected or dropped a call.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Error::Client { source, .. } | Error::WatchFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

fn require(kind: &'static str, field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidRequest {
            kind,
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}
