use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, TypedLocalObjectReference,
    VolumeResourceRequirements,
};
use kube::Resource;
use tracing::{info, instrument};

use crate::client::{CoreClient, SnapshotClient};
use crate::crd::VolumeSnapshot;
use crate::k8s_helper::{metadata::ObjectMetaBuilder, resources::ResourceRequirementBuilder};
use crate::lifecycle::{require, snapshot::SnapshotRequest, Error};

pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";
pub const DEFAULT_STORAGE_REQUEST: &str = "5Gi";

/// Overrides applied, in order, on top of the default claim.
///
/// Restoring from a snapshot and setting a storage class compose; the
/// restored size must still fit the request, which is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PvcOption {
    StorageClass(String),
    RestoreFromSnapshot(String),
    StorageRequest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvcRequest {
    pub namespace: String,
    pub name: String,
    pub access_modes: Vec<String>,
    pub storage_request: String,
    pub storage_class_name: Option<String>,
    /// Name of the VolumeSnapshot to restore from
    pub data_source: Option<String>,
}

impl PvcRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            access_modes: vec![DEFAULT_ACCESS_MODE.to_string()],
            storage_request: DEFAULT_STORAGE_REQUEST.to_string(),
            storage_class_name: None,
            data_source: None,
        }
    }

    pub fn apply(mut self, option: PvcOption) -> Self {
        match option {
            PvcOption::StorageClass(class) => self.storage_class_name = Some(class),
            PvcOption::RestoreFromSnapshot(snapshot) => self.data_source = Some(snapshot),
            PvcOption::StorageRequest(size) => self.storage_request = size,
        }
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        require("pvc", "namespace", &self.namespace)?;
        require("pvc", "name", &self.name)?;
        require("pvc", "storage request", &self.storage_request)?;

        if let Some(snapshot) = &self.data_source {
            require("pvc", "snapshot name", snapshot)?;
        }

        Ok(())
    }

    pub fn to_pvc(&self) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMetaBuilder::new()
                .name(&self.name)
                .namespace(&self.namespace)
                .build(),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(self.access_modes.clone()),
                storage_class_name: self.storage_class_name.clone(),
                resources: Some(VolumeResourceRequirements {
                    requests: ResourceRequirementBuilder::new()
                        .with_storage(&self.storage_request)
                        .into(),
                    ..Default::default()
                }),
                data_source: self.data_source.as_ref().map(|snapshot| {
                    TypedLocalObjectReference {
                        api_group: Some(VolumeSnapshot::group(&()).to_string()),
                        kind: VolumeSnapshot::kind(&()).to_string(),
                        name: snapshot.clone(),
                    }
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Creates, fetches and deletes claims, and snapshots them.
#[derive(Clone)]
pub struct PvcManager {
    client: Arc<dyn CoreClient>,
    snapshots: Arc<dyn SnapshotClient>,
}

impl PvcManager {
    pub fn new(client: Arc<dyn CoreClient>, snapshots: Arc<dyn SnapshotClient>) -> Self {
        Self { client, snapshots }
    }

    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn create(
        &self,
        namespace: &str,
        name: &str,
        options: impl IntoIterator<Item = PvcOption>,
    ) -> Result<PersistentVolumeClaim, Error> {
        let request = options
            .into_iter()
            .fold(PvcRequest::new(namespace, name), PvcRequest::apply);
        request.validate()?;

        info!(
            storage_class = request.storage_class_name.as_deref(),
            snapshot = request.data_source.as_deref(),
            "creating pvc"
        );

        self.client
            .create_pvc(request.to_pvc())
            .await
            .map_err(|source| client_error("create", namespace, name, source))
    }

    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn get(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim, Error> {
        info!("getting pvc");

        self.client
            .get_pvc(namespace, name)
            .await
            .map_err(|source| client_error("get", namespace, name, source))
    }

    #[instrument(skip_all, fields(namespace = %namespace, name = %name))]
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        info!("deleting pvc");

        self.client
            .delete_pvc(namespace, name)
            .await
            .map_err(|source| client_error("delete", namespace, name, source))
    }

    /// Snapshot `source_pvc_name`. The returned object's name is generated
    /// from `name`, so read it back rather than assuming it.
    #[instrument(
        skip_all,
        fields(namespace = %namespace, name = %name, source = %source_pvc_name)
    )]
    pub async fn create_volume_snapshot_from_pvc(
        &self,
        namespace: &str,
        name: &str,
        snapshot_class_name: Option<&str>,
        source_pvc_name: &str,
    ) -> Result<VolumeSnapshot, Error> {
        let request = SnapshotRequest::new(namespace, name, snapshot_class_name, source_pvc_name);
        request.validate()?;

        info!(
            snapshot_class = request.snapshot_class_name.as_deref(),
            "creating volume snapshot"
        );

        self.snapshots
            .create_snapshot(request.to_volume_snapshot())
            .await
            .map_err(|source| Error::Client {
                action: "create",
                kind: "volumesnapshot",
                namespace: namespace.to_string(),
                name: format!("{name}-"),
                source,
            })
    }
}

fn client_error(
    action: &'static str,
    namespace: &str,
    name: &str,
    source: crate::client::ClientError,
) -> Error {
    Error::Client {
        action,
        kind: "pvc",
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use super::*;

    fn requested_storage(pvc: &PersistentVolumeClaim) -> Option<Quantity> {
        pvc.spec
            .as_ref()?
            .resources
            .as_ref()?
            .requests
            .as_ref()?
            .get("storage")
            .cloned()
    }

    #[test]
    fn defaults_to_5gi_read_write_once() {
        let pvc = PvcRequest::new("default", "kmon-pvc").to_pvc();
        let spec = pvc.spec.as_ref().unwrap();

        assert_eq!(pvc.metadata.name.as_deref(), Some("kmon-pvc"));
        assert_eq!(
            spec.access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
        assert_eq!(requested_storage(&pvc), Some(Quantity("5Gi".to_string())));
        assert!(spec.storage_class_name.is_none());
        assert!(spec.data_source.is_none());
    }

    #[test]
    fn restore_points_at_volume_snapshot() {
        let pvc = PvcRequest::new("default", "kmon-pvc")
            .apply(PvcOption::RestoreFromSnapshot("kmon-snapshot".to_string()))
            .apply(PvcOption::StorageClass("fast".to_string()))
            .to_pvc();
        let spec = pvc.spec.unwrap();

        let source = spec.data_source.unwrap();
        assert_eq!(source.api_group.as_deref(), Some("snapshot.storage.k8s.io"));
        assert_eq!(source.kind, "VolumeSnapshot");
        assert_eq!(source.name, "kmon-snapshot");
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
    }

    #[test]
    fn storage_request_can_be_overridden() {
        let pvc = PvcRequest::new("default", "big")
            .apply(PvcOption::StorageRequest("20Gi".to_string()))
            .to_pvc();

        assert_eq!(requested_storage(&pvc), Some(Quantity("20Gi".to_string())));
    }

    #[test]
    fn blank_snapshot_name_is_rejected() {
        let err = PvcRequest::new("default", "kmon-pvc")
            .apply(PvcOption::RestoreFromSnapshot(" ".to_string()))
            .validate()
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid pvc request: snapshot name must not be empty"
        );
    }
}
