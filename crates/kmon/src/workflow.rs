//! Named workflows composed from the pod and PVC managers.
//!
//! Steps run strictly in order. A failed step aborts the workflow and leaves
//! whatever earlier steps created in place; the error names the failed step
//! so the operator knows what to inspect or clean up.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::{CoreClient, Handle, SnapshotClient};
use crate::config::{non_empty, Config, ConfigError, PodMode, PvcMode};
use crate::lifecycle::{self, PodManager, PodOption, PvcManager, PvcOption};

#[derive(Clone)]
pub struct Context {
    pub pods: PodManager,
    pub pvcs: PvcManager,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(
        core: Arc<dyn CoreClient>,
        snapshots: Arc<dyn SnapshotClient>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pods: PodManager::new(core.clone()),
            pvcs: PvcManager::new(core, snapshots),
            cancel,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{step} failed")]
    Step {
        step: &'static str,
        #[source]
        source: lifecycle::Error,
    },
}

impl WorkflowError {
    pub fn step(&self) -> Option<&'static str> {
        match self {
            WorkflowError::Step { step, .. } => Some(step),
            WorkflowError::Config(_) => None,
        }
    }
}

trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, WorkflowError>;
}

impl<T> StepExt<T> for Result<T, lifecycle::Error> {
    fn step(self, step: &'static str) -> Result<T, WorkflowError> {
        self.map_err(|source| WorkflowError::Step { step, source })
    }
}

/// Entry point for `kmon pod`.
pub async fn handle_pod_command(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let mode: PodMode = config.pod.mode.parse()?;
    info!(%mode, namespace = %config.namespace, "running pod workflow");

    match mode {
        PodMode::RunFromPvc => run_pod_from_pvc(ctx, config).await,
        PodMode::RunFromSnapshot => run_pod_from_snapshot(ctx, config).await,
        PodMode::Exec => exec_in_pod(ctx, config).await,
        PodMode::Delete => delete_pod(ctx, config).await,
        PodMode::SmokeTest => smoke_test(ctx, config).await,
    }
}

/// Entry point for `kmon pvc`.
pub async fn handle_pvc_command(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let mode: PvcMode = config.pvc.mode.parse()?;
    info!(%mode, namespace = %config.namespace, "running pvc workflow");

    match mode {
        PvcMode::SnapshotFromPvc => snapshot_from_pvc(ctx, config).await,
        PvcMode::PvcFromSnapshot => pvc_from_snapshot(ctx, config).await,
        PvcMode::Get => get_pvc(ctx, config).await,
        PvcMode::Delete => delete_pvc(ctx, config).await,
    }
}

fn pod_options(config: &Config, pvc_name: &str) -> Vec<PodOption> {
    vec![
        PodOption::Image(config.pod.image.clone()),
        PodOption::with_pvc(&config.pod.volume_name, &config.pod.mount_path, pvc_name),
    ]
}

fn restore_options(config: &Config, snapshot_name: &str) -> Vec<PvcOption> {
    let mut options = vec![
        PvcOption::RestoreFromSnapshot(snapshot_name.to_string()),
        PvcOption::StorageRequest(config.pvc.size.clone()),
    ];

    if let Some(class) = non_empty(&config.pvc.storage_class_name) {
        options.push(PvcOption::StorageClass(class.to_string()));
    }

    options
}

async fn run_pod_from_pvc(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let pod = ctx
        .pods
        .create(
            &config.namespace,
            &config.pod.name,
            pod_options(config, &config.pod.pvc_name),
        )
        .await
        .step("pod create")?
        .handle();

    // A pod that never becomes ready is left behind for inspection.
    ctx.pods
        .wait_ready(
            &pod.namespace,
            &pod.name,
            config.pod.wait_timeout(),
            &ctx.cancel,
        )
        .await
        .step("pod wait ready")?;

    info!(name = %pod.name, created = ?pod.creation_timestamp, "pod successfully created");
    Ok(())
}

/// Restore `pod.snapshot_name` into a claim named `pod.pvc_name` and start a
/// pod on it.
///
/// Unlike [`run_pod_from_pvc`] this does not wait for the pod to run, and a
/// failed pod creation leaves the restored claim in place.
async fn run_pod_from_snapshot(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let pvc = ctx
        .pvcs
        .create(
            &config.namespace,
            &config.pod.pvc_name,
            restore_options(config, &config.pod.snapshot_name),
        )
        .await
        .step("pvc create")?
        .handle();

    info!(name = %pvc.name, created = ?pvc.creation_timestamp, "pvc created");

    let pod = ctx
        .pods
        .create(
            &config.namespace,
            &config.pod.name,
            pod_options(config, &pvc.name),
        )
        .await
        .step("pod create")?
        .handle();

    info!(name = %pod.name, created = ?pod.creation_timestamp, "pod created");
    Ok(())
}

async fn exec_in_pod(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    ctx.pods
        .exec_interactive(
            &config.namespace,
            &config.pod.name,
            config.pod.exec_command.clone(),
            &ctx.cancel,
        )
        .await
        .step("pod exec")
}

async fn delete_pod(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    ctx.pods
        .delete(&config.namespace, &config.pod.name)
        .await
        .step("pod delete")?;

    ctx.pods
        .wait_deleted(
            &config.namespace,
            &config.pod.name,
            config.pod.wait_timeout(),
            &ctx.cancel,
        )
        .await
        .step("pod wait deleted")?;

    info!(name = %config.pod.name, "pod deleted");
    Ok(())
}

/// Provision a fresh claim and pod, list the mounted volume, then tear both
/// down again.
async fn smoke_test(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let namespace = config.namespace.as_str();
    let timeout = config.pod.wait_timeout();

    let mut pvc_options = vec![PvcOption::StorageRequest(config.pvc.size.clone())];
    if let Some(class) = non_empty(&config.pvc.storage_class_name) {
        pvc_options.push(PvcOption::StorageClass(class.to_string()));
    }

    let pvc = ctx
        .pvcs
        .create(namespace, &config.pvc.name, pvc_options)
        .await
        .step("pvc create")?
        .handle();
    info!(name = %pvc.name, "pvc created");

    let pod = ctx
        .pods
        .create(namespace, &config.pod.name, pod_options(config, &pvc.name))
        .await
        .step("pod create")?
        .handle();
    info!(name = %pod.name, created = ?pod.creation_timestamp, "pod created");

    ctx.pods
        .wait_ready(namespace, &pod.name, timeout, &ctx.cancel)
        .await
        .step("pod wait ready")?;

    let listing = vec![
        "ls".to_string(),
        "-lah".to_string(),
        config.pod.mount_path.clone(),
    ];
    ctx.pods
        .exec_interactive(namespace, &pod.name, listing, &ctx.cancel)
        .await
        .step("pod exec")?;

    ctx.pods
        .delete(namespace, &pod.name)
        .await
        .step("pod delete")?;
    ctx.pods
        .wait_deleted(namespace, &pod.name, timeout, &ctx.cancel)
        .await
        .step("pod wait deleted")?;
    info!(name = %pod.name, "pod deleted");

    ctx.pvcs
        .delete(namespace, &pvc.name)
        .await
        .step("pvc delete")?;
    info!(name = %pvc.name, "pvc deleted");

    Ok(())
}

async fn snapshot_from_pvc(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let snapshot = ctx
        .pvcs
        .create_volume_snapshot_from_pvc(
            &config.namespace,
            &config.pvc.snapshot_name,
            non_empty(&config.pvc.snapshot_class_name),
            &config.pvc.source_pvc_name,
        )
        .await
        .step("pvc snapshot")?
        .handle();

    info!(
        name = %snapshot.name,
        created = ?snapshot.creation_timestamp,
        source = %config.pvc.source_pvc_name,
        "pvc snapshot created"
    );
    Ok(())
}

async fn pvc_from_snapshot(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let pvc = ctx
        .pvcs
        .create(
            &config.namespace,
            &config.pvc.name,
            restore_options(config, &config.pvc.snapshot_name),
        )
        .await
        .step("pvc create")?
        .handle();

    info!(name = %pvc.name, created = ?pvc.creation_timestamp, "pvc created");
    Ok(())
}

async fn get_pvc(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    let pvc = ctx
        .pvcs
        .get(&config.namespace, &config.pvc.name)
        .await
        .step("pvc get")?
        .handle();

    info!(
        name = %pvc.name,
        phase = pvc.phase.as_deref().unwrap_or("Unknown"),
        created = ?pvc.creation_timestamp,
        "pvc found"
    );
    Ok(())
}

async fn delete_pvc(ctx: &Context, config: &Config) -> Result<(), WorkflowError> {
    ctx.pvcs
        .delete(&config.namespace, &config.pvc.name)
        .await
        .step("pvc delete")?;

    info!(name = %config.pvc.name, "pvc deleted");
    Ok(())
}
