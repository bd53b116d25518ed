use k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, Volume};

pub struct VolumeBuilder {
    inner: Volume,
}

impl VolumeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Volume {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn volume_claim(mut self, claim_name: &str) -> Self {
        self.inner.persistent_volume_claim = Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            ..Default::default()
        });
        self
    }
}

impl From<VolumeBuilder> for Volume {
    fn from(builder: VolumeBuilder) -> Self {
        builder.inner
    }
}
