use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{
    api::{Api, AttachParams, DeleteParams, PostParams, WatchParams},
    Client, ResourceExt,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::client::{
    ClientError, CoreClient, ExecIo, PodEventStream, SnapshotClient, WatchFrom,
};
use crate::crd::VolumeSnapshot;

/// The API server rejects watch timeouts of 295s and above.
const MAX_WATCH_SECS: u64 = 290;

/// Production facade backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn target_namespace<K: ResourceExt>(object: &K) -> Result<String, ClientError> {
    object.namespace().ok_or_else(|| ClientError::Invalid {
        message: format!("{} has no namespace set", object.name_any()),
    })
}

#[async_trait]
impl CoreClient for KubeClient {
    async fn create_pod(&self, pod: Pod) -> Result<Pod, ClientError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &target_namespace(&pod)?);
        Ok(api.create(&PostParams::default(), &pod).await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
        from: WatchFrom,
    ) -> Result<PodEventStream, ClientError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let timeout_secs = from.timeout.as_secs().clamp(1, MAX_WATCH_SECS);
        let params = WatchParams::default()
            .fields(&format!("metadata.name={name}"))
            .timeout(timeout_secs as u32);

        let stream = api.watch(&params, &from.resource_version).await?;

        Ok(stream.map_err(ClientError::from).boxed())
    }

    #[instrument(skip(self, io))]
    async fn exec_in_pod(
        &self,
        namespace: &str,
        name: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<(), ClientError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::interactive_tty();

        let mut attached = api.exec(name, command, &params).await?;

        let ExecIo {
            mut stdin,
            mut stdout,
            mut stderr,
        } = io;

        let mut remote_stdin = attached
            .stdin()
            .ok_or_else(|| ClientError::stream_failed("stdin not available"))?;
        let mut remote_stdout = attached
            .stdout()
            .ok_or_else(|| ClientError::stream_failed("stdout not available"))?;
        // With a terminal allocated the server merges stderr into stdout.
        let remote_stderr = attached.stderr();
        let status = attached.take_status();

        let forward_stdin = tokio::io::copy(&mut stdin, &mut remote_stdin);
        let forward_stdout = async {
            tokio::io::copy(&mut remote_stdout, &mut stdout).await?;
            stdout.flush().await
        };
        let forward_stderr = async {
            if let Some(mut remote_stderr) = remote_stderr {
                tokio::io::copy(&mut remote_stderr, &mut stderr).await?;
                stderr.flush().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let forward_output = async { tokio::try_join!(forward_stdout, forward_stderr) };
        tokio::pin!(forward_output);

        // Local input ending does not end the remote command.
        let copied = tokio::select! {
            copied = &mut forward_output => copied,
            _ = forward_stdin => forward_output.await,
        };
        copied.map_err(|e| ClientError::stream_failed(e.to_string()))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                debug!(?status, "exec finished");
                if status.status.as_deref() == Some("Failure") {
                    return Err(ClientError::stream_failed(
                        status
                            .message
                            .unwrap_or_else(|| "remote command failed".to_string()),
                    ));
                }
            }
        }

        attached
            .join()
            .await
            .map_err(|e| ClientError::stream_failed(e.to_string()))
    }

    async fn create_pvc(
        &self,
        pvc: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, ClientError> {
        let namespace = target_namespace(&pvc)?;
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), &pvc).await?)
    }

    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, ClientError> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotClient for KubeClient {
    async fn create_snapshot(
        &self,
        snapshot: VolumeSnapshot,
    ) -> Result<VolumeSnapshot, ClientError> {
        let namespace = target_namespace(&snapshot)?;
        let api: Api<VolumeSnapshot> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), &snapshot).await?)
    }
}
