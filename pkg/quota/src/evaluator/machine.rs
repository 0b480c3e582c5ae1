use async_trait::async_trait;
use std::sync::Arc;

use super::{CapabilitiesReader, Evaluator};
use crate::error::QuotaError;
use pkg_constants::quota::{
    CAPABILITY_CPU, CAPABILITY_MEMORY, RESOURCE_REQUESTS_CPU, RESOURCE_REQUESTS_MEMORY,
    SCOPE_MACHINE_CLASS,
};
use pkg_types::machine::Machine;
use pkg_types::object::{ObjectKind, TrackedObject};
use pkg_types::quantity::Quantity;
use pkg_types::resource::{ResourceList, ResourceName};
use pkg_types::scope::ScopeSelectorRequirement;

/// Machines consume one `count/machines` plus their class's CPU and memory.
pub struct MachineEvaluator {
    capabilities: Arc<dyn CapabilitiesReader>,
    resource_names: Vec<ResourceName>,
}

impl MachineEvaluator {
    pub fn new(capabilities: Arc<dyn CapabilitiesReader>) -> Self {
        Self {
            capabilities,
            resource_names: vec![
                ResourceName::object_count_for(ObjectKind::Machine.plural()),
                ResourceName::from(RESOURCE_REQUESTS_CPU),
                ResourceName::from(RESOURCE_REQUESTS_MEMORY),
            ],
        }
    }
}

fn as_machine(object: &TrackedObject) -> Result<&Machine, QuotaError> {
    match object {
        TrackedObject::Machine(machine) => Ok(machine),
        other => Err(QuotaError::InvalidObject(format!(
            "expected Machine but got {} {}/{}",
            other.kind(),
            other.namespace(),
            other.name()
        ))),
    }
}

#[async_trait]
impl Evaluator for MachineEvaluator {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Machine
    }

    fn resource_names(&self) -> &[ResourceName] {
        &self.resource_names
    }

    fn matches_scope_requirement(
        &self,
        object: &TrackedObject,
        requirement: &ScopeSelectorRequirement,
    ) -> Result<bool, QuotaError> {
        let machine = as_machine(object)?;
        match requirement.scope_name.as_str() {
            // The class reference is mandatory, so Exists always holds and DoesNotExist never does.
            SCOPE_MACHINE_CLASS => {
                Ok(requirement.matches_value(Some(&machine.spec.machine_class_ref)))
            }
            _ => Ok(false),
        }
    }

    async fn usage(&self, object: &TrackedObject) -> Result<ResourceList, QuotaError> {
        let machine = as_machine(object)?;
        let class_name = &machine.spec.machine_class_ref;

        let capabilities =
            self.capabilities
                .get(class_name)
                .await?
                .ok_or_else(|| QuotaError::ReferenceNotFound {
                    kind: "machine class",
                    name: class_name.clone(),
                })?;

        let mut usage = ResourceList::new();
        usage.insert(self.resource_names[0].clone(), Quantity::from_units(1));
        usage.insert(RESOURCE_REQUESTS_CPU, capabilities.get_or_zero(CAPABILITY_CPU));
        usage.insert(RESOURCE_REQUESTS_MEMORY, capabilities.get_or_zero(CAPABILITY_MEMORY));
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::StoreCapabilities;
    use crate::store::QuotaStore;
    use pkg_state::MemoryStore;
    use pkg_types::machine::MachineClass;
    use pkg_types::network::Network;
    use pkg_types::resource_list;
    use pkg_types::scope::{ScopeName, ScopeSelectorOperator};

    async fn evaluator() -> MachineEvaluator {
        let store = QuotaStore::new(Arc::new(MemoryStore::new()));
        store
            .put_machine_class(&MachineClass::new("gold", resource_list! { "cpu" => "4", "memory" => "8Gi" }))
            .await
            .unwrap();
        MachineEvaluator::new(Arc::new(StoreCapabilities::machine_classes(store)))
    }

    fn req(op: ScopeSelectorOperator, values: &[&str]) -> ScopeSelectorRequirement {
        ScopeSelectorRequirement::new(ScopeName::machine_class(), op, values)
    }

    #[tokio::test]
    async fn test_usage_comes_from_machine_class() {
        let eval = evaluator().await;
        let usage = eval
            .usage(&Machine::new("ns", "m", "gold").into())
            .await
            .unwrap();
        assert_eq!(
            usage,
            resource_list! { "count/machines" => "1", "requests.cpu" => "4", "requests.memory" => "8Gi" }
        );
    }

    #[tokio::test]
    async fn test_unknown_class_is_reference_not_found() {
        let eval = evaluator().await;
        let err = eval
            .usage(&Machine::new("ns", "m", "platinum").into())
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::ReferenceNotFound { ref name, .. } if name == "platinum"));
    }

    #[tokio::test]
    async fn test_machine_class_scope() {
        let eval = evaluator().await;
        let machine: TrackedObject = Machine::new("ns", "m", "gold").into();

        assert!(eval.matches_scope_requirement(&machine, &req(ScopeSelectorOperator::Exists, &[])).unwrap());
        assert!(!eval.matches_scope_requirement(&machine, &req(ScopeSelectorOperator::DoesNotExist, &[])).unwrap());
        assert!(eval.matches_scope_requirement(&machine, &req(ScopeSelectorOperator::In, &["gold", "silver"])).unwrap());
        assert!(!eval.matches_scope_requirement(&machine, &req(ScopeSelectorOperator::In, &["silver"])).unwrap());
        assert!(eval.matches_scope_requirement(&machine, &req(ScopeSelectorOperator::NotIn, &["silver"])).unwrap());
        assert!(!eval.matches_scope_requirement(&machine, &req(ScopeSelectorOperator::NotIn, &["gold"])).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_scope_does_not_match() {
        let eval = evaluator().await;
        let machine: TrackedObject = Machine::new("ns", "m", "gold").into();
        let other = ScopeSelectorRequirement::new(ScopeName::volume_class(), ScopeSelectorOperator::Exists, &[]);
        assert!(!eval.matches_scope_requirement(&machine, &other).unwrap());
    }

    #[tokio::test]
    async fn test_wrong_kind_is_rejected() {
        let eval = evaluator().await;
        let network: TrackedObject = Network::new("ns", "n").into();
        assert!(matches!(
            eval.usage(&network).await,
            Err(QuotaError::InvalidObject(_))
        ));
    }

    #[tokio::test]
    async fn test_declares_resource_names() {
        let eval = evaluator().await;
        assert!(eval.matches_resource_name(&ResourceName::from("requests.cpu")));
        assert!(eval.matches_resource_name(&ResourceName::from("count/machines")));
        assert!(!eval.matches_resource_name(&ResourceName::from("requests.storage")));
    }
}
