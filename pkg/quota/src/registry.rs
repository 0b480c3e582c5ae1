use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::error::QuotaError;
use crate::evaluator::{
    Evaluator, MachineEvaluator, ObjectCountEvaluator, StoreCapabilities, VolumeEvaluator,
};
use crate::store::QuotaStore;
use pkg_types::object::{ObjectKind, TrackedObject};
use pkg_types::resource::ResourceName;

static GLOBAL_REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

/// Object kind → evaluator.
///
/// Built mutably during startup, then frozen behind an `Arc` and shared.
/// Nothing mutates it after that, so readers need no locking.
#[derive(Default)]
pub struct Registry {
    evaluators: BTreeMap<ObjectKind, Arc<dyn Evaluator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The machine, volume and network evaluators, resolving classes through `store`.
    pub fn with_default_evaluators(store: &QuotaStore) -> Result<Self, QuotaError> {
        let mut registry = Self::new();
        registry.register(Arc::new(MachineEvaluator::new(Arc::new(
            StoreCapabilities::machine_classes(store.clone()),
        ))))?;
        registry.register(Arc::new(VolumeEvaluator::new(Arc::new(
            StoreCapabilities::volume_classes(store.clone()),
        ))))?;
        registry.register(Arc::new(ObjectCountEvaluator::new(ObjectKind::Network)))?;
        Ok(registry)
    }

    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) -> Result<(), QuotaError> {
        let kind = evaluator.kind();
        if self.evaluators.contains_key(&kind) {
            return Err(QuotaError::DuplicateEvaluator(kind));
        }
        info!(
            "Registered quota evaluator for {} ({} resource names)",
            kind,
            evaluator.resource_names().len()
        );
        self.evaluators.insert(kind, evaluator);
        Ok(())
    }

    pub fn evaluator_for(&self, kind: ObjectKind) -> Option<&Arc<dyn Evaluator>> {
        self.evaluators.get(&kind)
    }

    pub fn evaluator_for_object(&self, object: &TrackedObject) -> Option<&Arc<dyn Evaluator>> {
        self.evaluator_for(object.kind())
    }

    /// Evaluators able to report `name`.
    pub fn evaluators_matching_resource_name(&self, name: &ResourceName) -> Vec<Arc<dyn Evaluator>> {
        self.evaluators
            .values()
            .filter(|e| e.matches_resource_name(name))
            .cloned()
            .collect()
    }

    /// Evaluators able to report at least one of `names`.
    pub fn evaluators_matching_any(&self, names: &[ResourceName]) -> Vec<Arc<dyn Evaluator>> {
        self.evaluators
            .values()
            .filter(|e| names.iter().any(|n| e.matches_resource_name(n)))
            .cloned()
            .collect()
    }

    pub fn kinds(&self) -> Vec<ObjectKind> {
        self.evaluators.keys().copied().collect()
    }

    /// Freeze this registry as the process-wide one. Only the first call succeeds.
    pub fn install_global(self) -> Result<Arc<Registry>, QuotaError> {
        let registry = Arc::new(self);
        GLOBAL_REGISTRY
            .set(registry.clone())
            .map_err(|_| QuotaError::RegistryAlreadyInstalled)?;
        Ok(registry)
    }

    /// The process-wide registry, once installed.
    pub fn global() -> Option<Arc<Registry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}
