use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Pod, PodSpec};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::client::{CoreClient, ExecIo};
use crate::k8s_helper::{
    container::ContainerBuilder, metadata::ObjectMetaBuilder, volume::VolumeBuilder,
};
use crate::lifecycle::{
    require,
    wait::{wait_for, WaitCondition, WaitError},
    Error,
};

pub const DEFAULT_CONTAINER_NAME: &str = "netshoot";
pub const DEFAULT_IMAGE: &str = "ghcr.io/nicolaka/netshoot:v0.14";

fn idle_command() -> Vec<String> {
    vec!["tail".into(), "-f".into(), "/dev/null".into()]
}

/// A PVC mounted into the pod's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
    pub volume_name: String,
    pub mount_path: String,
    pub pvc_name: String,
}

/// Overrides applied, in order, on top of the default pod.
#[derive(Debug, Clone)]
pub enum PodOption {
    Labels(BTreeMap<String, String>),
    Annotations(BTreeMap<String, String>),
    Volume(VolumeAttachment),
    Image(String),
    Command(Vec<String>),
}

impl PodOption {
    pub fn with_pvc(
        volume_name: impl Into<String>,
        mount_path: impl Into<String>,
        pvc_name: impl Into<String>,
    ) -> Self {
        PodOption::Volume(VolumeAttachment {
            volume_name: volume_name.into(),
            mount_path: mount_path.into(),
            pvc_name: pvc_name.into(),
        })
    }
}

/// Everything needed to build a single-container debug pod.
#[derive(Debug, Clone)]
pub struct PodRequest {
    pub namespace: String,
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub volume: Option<VolumeAttachment>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl PodRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            image: DEFAULT_IMAGE.to_string(),
            command: idle_command(),
            volume: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn apply(mut self, option: PodOption) -> Self {
        match option {
            PodOption::Labels(labels) => self.labels = labels,
            PodOption::Annotations(annotations) => self.annotations = annotations,
            // A pod only ever carries one attachment; a later one replaces it.
            PodOption::Volume(volume) => self.volume = Some(volume),
            PodOption::Image(image) => self.image = image,
            PodOption::Command(command) => self.command = command,
        }
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        require("pod", "namespace", &self.namespace)?;
        require("pod", "name", &self.name)?;
        require("pod", "image", &self.image)?;

        if let Some(volume) = &self.volume {
            require("pod", "volume name", &volume.volume_name)?;
            require("pod", "mount path", &volume.mount_path)?;
            require("pod", "pvc name", &volume.pvc_name)?;
        }

        Ok(())
    }

    pub fn to_pod(&self) -> Pod {
        let mut container = ContainerBuilder::new(DEFAULT_CONTAINER_NAME)
            .image(&self.image)
            .pull_policy("IfNotPresent");

        if !self.command.is_empty() {
            container = container.command(self.command.clone());
        }

        if let Some(volume) = &self.volume {
            container = container.with_mount(&volume.volume_name, &volume.mount_path);
        }

        let volumes = self.volume.as_ref().map(|volume| {
            vec![VolumeBuilder::new(&volume.volume_name)
                .volume_claim(&volume.pvc_name)
                .into()]
        });

        Pod {
            metadata: ObjectMetaBuilder::new()
                .name(&self.name)
                .namespace(&self.namespace)
                .with_labels(&self.labels)
                .with_annotations(&self.annotations)
                .into(),
            spec: Some(PodSpec {
                containers: vec![container.into()],
                volumes,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Creates, watches, execs into and deletes pods.
#[derive(Clone)]
pub struct PodManager {
    client: Arc<dyn CoreClient>,
}

impl PodManager {
    pub fn new(client: Arc<dyn CoreClient>) -> Self {
        Self { client }
    }

    /// Create a pod from the defaults plus `options`.
    ///
    /// Not idempotent: a second call with the same name surfaces the
    /// cluster's AlreadyExists.
    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn create(
        &self,
        namespace: &str,
        name: &str,
        options: impl IntoIterator<Item = PodOption>,
    ) -> Result<Pod, Error> {
        let request = options
            .into_iter()
            .fold(PodRequest::new(namespace, name), PodRequest::apply);
        request.validate()?;

        info!("creating pod");

        self.client
            .create_pod(request.to_pod())
            .await
            .map_err(|source| Error::Client {
                action: "create",
                kind: "pod",
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })
    }

    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn wait_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        info!(timeout_secs = timeout.as_secs(), "waiting for pod to become ready");
        self.wait(namespace, name, WaitCondition::PodRunning, timeout, cancel)
            .await
    }

    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn wait_deleted(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        info!(timeout_secs = timeout.as_secs(), "waiting for pod to be deleted");
        self.wait(namespace, name, WaitCondition::PodDeleted, timeout, cancel)
            .await
    }

    async fn wait(
        &self,
        namespace: &str,
        name: &str,
        condition: WaitCondition,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let client = &self.client;

        wait_for(
            |from| client.watch_pod(namespace, name, from),
            condition,
            timeout,
            cancel,
        )
        .await
        .map_err(|err| match err {
            WaitError::Timeout => Error::Timeout {
                condition,
                namespace: namespace.to_string(),
                name: name.to_string(),
                timeout,
            },
            WaitError::Watch(source) => Error::WatchFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            },
            WaitError::Cancelled => Error::Cancelled {
                kind: "pod",
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
        })
    }

    /// Issue the delete. Use [`PodManager::wait_deleted`] to wait for it.
    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        info!("deleting pod");

        self.client
            .delete_pod(namespace, name)
            .await
            .map_err(|source| Error::Client {
                action: "delete",
                kind: "pod",
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })
    }

    /// Run `command` in the pod with this process' stdin/stdout/stderr
    /// attached, until it exits or `cancel` fires.
    pub async fn exec_interactive(
        &self,
        namespace: &str,
        name: &str,
        command: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        self.exec(namespace, name, command, ExecIo::stdio(), cancel)
            .await
    }

    #[instrument(skip(self, io, cancel), fields(namespace = %namespace, name = %name))]
    pub async fn exec(
        &self,
        namespace: &str,
        name: &str,
        command: Vec<String>,
        io: ExecIo,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        info!("executing in pod");

        let result = tokio::select! {
            result = self.client.exec_in_pod(namespace, name, command, io) => result,
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled {
                    kind: "pod",
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
        };

        result.map_err(|source| Error::Client {
            action: "exec in",
            kind: "pod",
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })
    }
}
