use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

#[derive(Default)]
pub struct ResourceRequirementBuilder {
    inner: BTreeMap<String, Quantity>,
}

impl ResourceRequirementBuilder {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn storage(mut self, quantity: Quantity) -> Self {
        self.inner.insert("storage".to_string(), quantity);
        self
    }

    pub fn with_storage(self, quantity: impl ToString) -> Self {
        self.storage(Quantity(quantity.to_string()))
    }

    pub fn build(self) -> BTreeMap<String, Quantity> {
        self.inner
    }
}

impl From<ResourceRequirementBuilder> for Option<BTreeMap<String, Quantity>> {
    fn from(builder: ResourceRequirementBuilder) -> Self {
        Some(builder.build())
    }
}
