//! Per-kind usage computation and scope predicates.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::QuotaError;
use crate::store::QuotaStore;
use pkg_constants::state::{MACHINE_CLASSES_PREFIX, VOLUME_CLASSES_PREFIX};
use pkg_types::object::{ObjectKind, TrackedObject};
use pkg_types::quantity::Quantity;
use pkg_types::resource::{ResourceList, ResourceName};
use pkg_types::scope::ScopeSelectorRequirement;

pub mod count;
pub mod machine;
pub mod volume;

pub use count::ObjectCountEvaluator;
pub use machine::MachineEvaluator;
pub use volume::VolumeEvaluator;

/// Quota logic for one object kind.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// The kind this evaluator handles.
    fn kind(&self) -> ObjectKind;

    /// Every resource name this evaluator can report.
    fn resource_names(&self) -> &[ResourceName];

    fn matches_resource_name(&self, name: &ResourceName) -> bool {
        self.resource_names().contains(name)
    }

    /// Kind-specific scope predicate. Unknown scope names do not match and are not an error.
    fn matches_scope_requirement(
        &self,
        object: &TrackedObject,
        requirement: &ScopeSelectorRequirement,
    ) -> Result<bool, QuotaError>;

    /// Resources `object` consumes. May resolve class references through the store.
    async fn usage(&self, object: &TrackedObject) -> Result<ResourceList, QuotaError>;

    /// The part of `usage` that needs no external lookup. Defaults to the object count.
    fn local_usage(&self, object: &TrackedObject) -> ResourceList {
        let count = ResourceName::object_count_for(object.kind().plural());
        let mut usage = ResourceList::new();
        if object.kind() == self.kind() && self.matches_resource_name(&count) {
            usage.insert(count, Quantity::from_units(1));
        }
        usage
    }
}

/// Usage of an object that is already stored. A reference that no longer
/// resolves falls back to [`Evaluator::local_usage`]; releasing or counting
/// an existing object must not fail because its class was removed.
pub async fn existing_usage(
    evaluator: &dyn Evaluator,
    object: &TrackedObject,
) -> Result<ResourceList, QuotaError> {
    match evaluator.usage(object).await {
        Err(QuotaError::ReferenceNotFound { kind, name }) => {
            warn!(
                "{} {}/{} references missing {} {:?}, counting only local usage",
                object.kind(),
                object.namespace(),
                object.name(),
                kind,
                name
            );
            Ok(evaluator.local_usage(object))
        }
        other => other,
    }
}

/// Resolves a class name to its capabilities.
#[async_trait]
pub trait CapabilitiesReader: Send + Sync {
    async fn get(&self, class_name: &str) -> Result<Option<ResourceList>, QuotaError>;
}

#[derive(Deserialize)]
struct ClassCapabilities {
    #[serde(default)]
    capabilities: ResourceList,
}

/// Reads class capabilities from the object store.
#[derive(Clone)]
pub struct StoreCapabilities {
    store: QuotaStore,
    prefix: &'static str,
}

impl StoreCapabilities {
    pub fn machine_classes(store: QuotaStore) -> Self {
        Self {
            store,
            prefix: MACHINE_CLASSES_PREFIX,
        }
    }

    pub fn volume_classes(store: QuotaStore) -> Self {
        Self {
            store,
            prefix: VOLUME_CLASSES_PREFIX,
        }
    }
}

#[async_trait]
impl CapabilitiesReader for StoreCapabilities {
    async fn get(&self, class_name: &str) -> Result<Option<ResourceList>, QuotaError> {
        let key = format!("{}{}", self.prefix, class_name);
        Ok(self
            .store
            .get_json::<ClassCapabilities>(&key)
            .await?
            .map(|(class, _)| class.capabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::MemoryStore;
    use pkg_types::machine::{Machine, MachineClass};
    use pkg_types::network::Network;
    use pkg_types::resource_list;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_capabilities_resolve_by_prefix() {
        let store = QuotaStore::new(Arc::new(MemoryStore::new()));
        store
            .put_machine_class(&MachineClass::new("gold", resource_list! { "cpu" => "4", "memory" => "8Gi" }))
            .await
            .unwrap();

        let machines = StoreCapabilities::machine_classes(store.clone());
        let caps = machines.get("gold").await.unwrap().unwrap();
        assert_eq!(caps.get_or_zero("memory").to_string(), "8Gi");
        assert!(machines.get("silver").await.unwrap().is_none());

        // same name, different class kind
        let volumes = StoreCapabilities::volume_classes(store);
        assert!(volumes.get("gold").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_machine_without_class_counts_only_itself() {
        let store = QuotaStore::new(Arc::new(MemoryStore::new()));
        let eval = MachineEvaluator::new(Arc::new(StoreCapabilities::machine_classes(store)));
        let machine: TrackedObject = Machine::new("ns", "m", "gone").into();

        assert!(matches!(
            eval.usage(&machine).await,
            Err(QuotaError::ReferenceNotFound { .. })
        ));
        let usage = existing_usage(&eval, &machine).await.unwrap();
        assert_eq!(usage, resource_list! { "count/machines" => "1" });
    }

    #[tokio::test]
    async fn test_existing_usage_keeps_other_errors() {
        let store = QuotaStore::new(Arc::new(MemoryStore::new()));
        let eval = MachineEvaluator::new(Arc::new(StoreCapabilities::machine_classes(store)));
        let network: TrackedObject = Network::new("ns", "n").into();
        assert!(matches!(
            existing_usage(&eval, &network).await,
            Err(QuotaError::InvalidObject(_))
        ));
    }
}
