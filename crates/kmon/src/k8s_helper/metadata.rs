use std::collections::BTreeMap;

use kube::api::ObjectMeta;

#[derive(Default)]
pub struct ObjectMetaBuilder {
    inner: ObjectMeta,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self {
            inner: Default::default(),
        }
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.inner.name = Some(name.into());
        self
    }

    /// Let the API server pick the name, using `prefix` as its start.
    pub fn generate_name<T: Into<String>>(mut self, prefix: T) -> Self {
        self.inner.generate_name = Some(prefix.into());
        self
    }

    pub fn namespace<T: ToString>(mut self, namespace: T) -> Self {
        self.inner.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_label<T: ToString, U: ToString>(mut self, label: T, value: U) -> Self {
        let mut labels = self.inner.labels.unwrap_or_default();

        labels.insert(label.to_string(), value.to_string());

        self.inner.labels = Some(labels);
        self
    }

    pub fn with_labels(self, labels: &BTreeMap<String, String>) -> Self {
        labels
            .iter()
            .fold(self, |builder, (key, value)| builder.with_label(key, value))
    }

    pub fn with_annotation<T: ToString, U: ToString>(mut self, key: T, value: U) -> Self {
        let mut annotations = self.inner.annotations.unwrap_or_default();

        annotations.insert(key.to_string(), value.to_string());

        self.inner.annotations = Some(annotations);
        self
    }

    pub fn with_annotations(self, annotations: &BTreeMap<String, String>) -> Self {
        annotations
            .iter()
            .fold(self, |builder, (key, value)| builder.with_annotation(key, value))
    }

    pub fn build(self) -> ObjectMeta {
        self.inner
    }
}

impl From<ObjectMetaBuilder> for ObjectMeta {
    fn from(builder: ObjectMetaBuilder) -> Self {
        builder.build()
    }
}
