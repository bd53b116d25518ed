use k8s_openapi::api::core::v1::{Container, VolumeMount};

pub struct ContainerBuilder {
    inner: Container,
}

impl ContainerBuilder {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            inner: Container {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    pub fn pull_policy(mut self, policy: &str) -> Self {
        self.inner.image_pull_policy = Some(policy.into());
        self
    }

    pub fn image<T: Into<String>>(mut self, image: T) -> Self {
        self.inner.image = Some(image.into());
        self
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.inner.command = Some(command);
        self
    }

    pub fn with_mount<T: ToString, U: ToString>(mut self, name: T, path: U) -> Self {
        let mount = VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        };
        let mut mounts = self.inner.volume_mounts.unwrap_or_default();

        mounts.push(mount);

        self.inner.volume_mounts = Some(mounts);
        self
    }
}

impl From<ContainerBuilder> for Container {
    fn from(builder: ContainerBuilder) -> Self {
        builder.inner
    }
}
