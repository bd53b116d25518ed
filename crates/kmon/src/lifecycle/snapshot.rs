use kube::api::ObjectMeta;

use crate::crd::{VolumeSnapshot, VolumeSnapshotSource, VolumeSnapshotSpec};
use crate::k8s_helper::metadata::ObjectMetaBuilder;
use crate::lifecycle::{require, Error};

/// A snapshot of an existing claim. The API server names the object, using
/// `"{prefix}-"` as the start of the generated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub namespace: String,
    pub generated_name_prefix: String,
    pub source_pvc_name: String,
    pub snapshot_class_name: Option<String>,
}

impl SnapshotRequest {
    pub fn new(
        namespace: impl Into<String>,
        prefix: impl Into<String>,
        snapshot_class_name: Option<&str>,
        source_pvc_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            generated_name_prefix: prefix.into(),
            source_pvc_name: source_pvc_name.into(),
            // An empty class name means "use the cluster default".
            snapshot_class_name: snapshot_class_name
                .filter(|class| !class.is_empty())
                .map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        require("volumesnapshot", "namespace", &self.namespace)?;
        require("volumesnapshot", "name", &self.generated_name_prefix)?;
        require("volumesnapshot", "source pvc name", &self.source_pvc_name)
    }

    pub fn to_volume_snapshot(&self) -> VolumeSnapshot {
        let metadata: ObjectMeta = ObjectMetaBuilder::new()
            .generate_name(format!("{}-", self.generated_name_prefix))
            .namespace(&self.namespace)
            .into();

        VolumeSnapshot {
            metadata,
            spec: VolumeSnapshotSpec {
                source: VolumeSnapshotSource {
                    persistent_volume_claim_name: Some(self.source_pvc_name.clone()),
                    volume_snapshot_content_name: None,
                },
                volume_snapshot_class_name: self.snapshot_class_name.clone(),
            },
            status: None,
        }
    }
}
