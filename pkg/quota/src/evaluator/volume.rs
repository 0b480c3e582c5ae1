use async_trait::async_trait;
use std::sync::Arc;

use super::{CapabilitiesReader, Evaluator};
use crate::error::QuotaError;
use pkg_constants::quota::{CAPABILITY_STORAGE, RESOURCE_REQUESTS_STORAGE, SCOPE_VOLUME_CLASS};
use pkg_types::object::{ObjectKind, TrackedObject};
use pkg_types::quantity::Quantity;
use pkg_types::resource::{ResourceList, ResourceName};
use pkg_types::scope::ScopeSelectorRequirement;
use pkg_types::volume::Volume;

/// Volumes consume one `count/volumes` plus their requested storage.
/// A class reference is optional but must resolve when set.
pub struct VolumeEvaluator {
    capabilities: Arc<dyn CapabilitiesReader>,
    resource_names: Vec<ResourceName>,
}

impl VolumeEvaluator {
    pub fn new(capabilities: Arc<dyn CapabilitiesReader>) -> Self {
        Self {
            capabilities,
            resource_names: vec![
                ResourceName::object_count_for(ObjectKind::Volume.plural()),
                ResourceName::from(RESOURCE_REQUESTS_STORAGE),
            ],
        }
    }
}

fn as_volume(object: &TrackedObject) -> Result<&Volume, QuotaError> {
    match object {
        TrackedObject::Volume(volume) => Ok(volume),
        other => Err(QuotaError::InvalidObject(format!(
            "expected Volume but got {} {}/{}",
            other.kind(),
            other.namespace(),
            other.name()
        ))),
    }
}

#[async_trait]
impl Evaluator for VolumeEvaluator {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Volume
    }

    fn resource_names(&self) -> &[ResourceName] {
        &self.resource_names
    }

    fn matches_scope_requirement(
        &self,
        object: &TrackedObject,
        requirement: &ScopeSelectorRequirement,
    ) -> Result<bool, QuotaError> {
        let volume = as_volume(object)?;
        match requirement.scope_name.as_str() {
            SCOPE_VOLUME_CLASS => {
                Ok(requirement.matches_value(volume.spec.volume_class_ref.as_deref()))
            }
            _ => Ok(false),
        }
    }

    async fn usage(&self, object: &TrackedObject) -> Result<ResourceList, QuotaError> {
        let volume = as_volume(object)?;

        if let Some(class_name) = &volume.spec.volume_class_ref
            && self.capabilities.get(class_name).await?.is_none()
        {
            return Err(QuotaError::ReferenceNotFound {
                kind: "volume class",
                name: class_name.clone(),
            });
        }

        Ok(self.local_usage(object))
    }

    /// Count and requested storage both come from the volume itself.
    fn local_usage(&self, object: &TrackedObject) -> ResourceList {
        let mut usage = ResourceList::new();
        if let TrackedObject::Volume(volume) = object {
            usage.insert(self.resource_names[0].clone(), Quantity::from_units(1));
            usage.insert(
                RESOURCE_REQUESTS_STORAGE,
                volume.spec.resources.get_or_zero(CAPABILITY_STORAGE),
            );
        }
        usage
    }
}
