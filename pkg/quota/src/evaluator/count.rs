use async_trait::async_trait;

use super::Evaluator;
use crate::error::QuotaError;
use pkg_types::object::{ObjectKind, TrackedObject};
use pkg_types::quantity::Quantity;
use pkg_types::resource::{ResourceList, ResourceName};
use pkg_types::scope::ScopeSelectorRequirement;

/// Counts objects of one kind and nothing else. Recognizes no scopes.
pub struct ObjectCountEvaluator {
    kind: ObjectKind,
    resource_names: Vec<ResourceName>,
}

impl ObjectCountEvaluator {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            resource_names: vec![ResourceName::object_count_for(kind.plural())],
        }
    }

    fn check_kind(&self, object: &TrackedObject) -> Result<(), QuotaError> {
        if object.kind() != self.kind {
            return Err(QuotaError::InvalidObject(format!(
                "expected {} but got {} {}/{}",
                self.kind,
                object.kind(),
                object.namespace(),
                object.name()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Evaluator for ObjectCountEvaluator {
    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn resource_names(&self) -> &[ResourceName] {
        &self.resource_names
    }

    fn matches_scope_requirement(
        &self,
        object: &TrackedObject,
        _requirement: &ScopeSelectorRequirement,
    ) -> Result<bool, QuotaError> {
        self.check_kind(object)?;
        Ok(false)
    }

    async fn usage(&self, object: &TrackedObject) -> Result<ResourceList, QuotaError> {
        self.check_kind(object)?;
        Ok(self
            .resource_names
            .iter()
            .map(|name| (name.clone(), Quantity::from_units(1)))
            .collect())
    }
}
