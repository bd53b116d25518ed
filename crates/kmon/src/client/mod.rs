//! The seam between kmon's workflows and the cluster.
//!
//! Two capability traits are exposed: [`CoreClient`] for pods and claims, and
//! [`SnapshotClient`] for the CSI snapshot API. [`KubeClient`] implements both
//! on top of `kube`; tests substitute an in-memory fake.

mod connection;
mod error;
mod kube_client;
mod types;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};

use crate::crd::VolumeSnapshot;

pub use connection::{connect, ConnectionError};
pub use error::ClientError;
pub use kube_client::KubeClient;
pub use types::{ExecIo, Handle, PodEventStream, ResourceHandle, WatchEvent, WatchFrom};

/// Pod and PersistentVolumeClaim operations.
#[async_trait]
pub trait CoreClient: Send + Sync {
    /// Create a pod in the namespace set on its metadata.
    async fn create_pod(&self, pod: Pod) -> Result<Pod, ClientError>;

    /// Issue a delete for a pod. Returns as soon as the API server accepted it.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClientError>;

    /// Open a watch scoped to a single pod. The server may end the session
    /// before `from.timeout`; callers reopen it from the last version seen.
    async fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
        from: WatchFrom,
    ) -> Result<PodEventStream, ClientError>;

    /// Run `command` in the pod's first container with the given streams
    /// attached and a pseudo-terminal requested. Blocks until the remote
    /// process exits.
    async fn exec_in_pod(
        &self,
        namespace: &str,
        name: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<(), ClientError>;

    async fn create_pvc(&self, pvc: PersistentVolumeClaim)
        -> Result<PersistentVolumeClaim, ClientError>;

    async fn get_pvc(&self, namespace: &str, name: &str)
        -> Result<PersistentVolumeClaim, ClientError>;

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
}

/// VolumeSnapshot operations.
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    async fn create_snapshot(&self, snapshot: VolumeSnapshot)
        -> Result<VolumeSnapshot, ClientError>;
}
