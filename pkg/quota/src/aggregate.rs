use std::sync::Arc;
use tracing::debug;

use crate::error::QuotaError;
use crate::evaluator::existing_usage;
use crate::registry::Registry;
use crate::scope::checked_matches_scope_selector;
use crate::store::QuotaStore;
use pkg_types::quantity::Quantity;
use pkg_types::resource::{ResourceList, ResourceName};
use pkg_types::scope::ScopeSelector;

/// Sums usage over stored objects. Used for reconciliation, never on the admission path.
#[derive(Clone)]
pub struct UsageAggregator {
    store: QuotaStore,
    registry: Arc<Registry>,
}

impl UsageAggregator {
    pub fn new(store: QuotaStore, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Total usage of `tracked` names by objects in `namespace` that match `selector`.
    /// Every tracked name appears in the result, zero if nothing consumes it.
    /// Objects whose class is gone contribute only what they carry themselves.
    pub async fn aggregate_usage(
        &self,
        namespace: &str,
        tracked: &[ResourceName],
        selector: Option<&ScopeSelector>,
    ) -> Result<ResourceList, QuotaError> {
        let mut total: ResourceList = tracked
            .iter()
            .map(|name| (name.clone(), Quantity::ZERO))
            .collect();

        for evaluator in self.registry.evaluators_matching_any(tracked) {
            let objects = self.store.list_objects(namespace, evaluator.kind()).await?;
            let mut counted = 0usize;
            for object in &objects {
                if !checked_matches_scope_selector(object, evaluator.as_ref(), selector)? {
                    continue;
                }
                let usage = existing_usage(evaluator.as_ref(), object).await?;
                total = total.add(&usage.mask(tracked.iter()))?;
                counted += 1;
            }
            debug!(
                "Aggregated {}/{} {} objects in namespace {}",
                counted,
                objects.len(),
                evaluator.kind(),
                namespace
            );
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::MemoryStore;
    use pkg_types::machine::{Machine, MachineClass};
    use pkg_types::network::Network;
    use pkg_types::resource_list;
    use pkg_types::scope::{ScopeName, ScopeSelectorOperator, ScopeSelectorRequirement};
    use pkg_types::volume::Volume;

    async fn setup() -> (QuotaStore, UsageAggregator) {
        let store = QuotaStore::new(Arc::new(MemoryStore::new()));
        store
            .put_machine_class(&MachineClass::new("gold", resource_list! { "cpu" => "4", "memory" => "8Gi" }))
            .await
            .unwrap();
        store
            .put_machine_class(&MachineClass::new("silver", resource_list! { "cpu" => "2", "memory" => "4Gi" }))
            .await
            .unwrap();
        let registry = Arc::new(Registry::with_default_evaluators(&store).unwrap());
        let aggregator = UsageAggregator::new(store.clone(), registry);
        (store, aggregator)
    }

    fn names(list: &[&str]) -> Vec<ResourceName> {
        list.iter().map(|n| ResourceName::from(*n)).collect()
    }

    #[tokio::test]
    async fn test_sums_exactly_the_namespace_and_scope_matches() {
        let (store, aggregator) = setup().await;
        store.put_object(&Machine::new("team-a", "m1", "gold").into()).await.unwrap();
        store.put_object(&Machine::new("team-a", "m2", "silver").into()).await.unwrap();
        store.put_object(&Machine::new("team-a", "m3", "gold").into()).await.unwrap();
        store.put_object(&Machine::new("team-b", "m4", "gold").into()).await.unwrap();
        store
            .put_object(&Volume::new("team-a", "v1", None, resource_list! { "storage" => "5Gi" }).into())
            .await
            .unwrap();

        let tracked = names(&["count/machines", "requests.cpu", "requests.memory", "requests.storage"]);

        let all = aggregator.aggregate_usage("team-a", &tracked, None).await.unwrap();
        assert_eq!(
            all,
            resource_list! {
                "count/machines" => "3",
                "requests.cpu" => "10",
                "requests.memory" => "20Gi",
                "requests.storage" => "5Gi",
            }
        );

        let gold_only = ScopeSelector::new(vec![ScopeSelectorRequirement::new(
            ScopeName::machine_class(),
            ScopeSelectorOperator::In,
            &["gold"],
        )]);
        let gold = aggregator
            .aggregate_usage("team-a", &tracked, Some(&gold_only))
            .await
            .unwrap();
        // volumes don't understand MachineClass, so the scoped total excludes them
        assert_eq!(
            gold,
            resource_list! {
                "count/machines" => "2",
                "requests.cpu" => "8",
                "requests.memory" => "16Gi",
                "requests.storage" => "0",
            }
        );
    }

    #[tokio::test]
    async fn test_untracked_names_are_not_reported() {
        let (store, aggregator) = setup().await;
        store.put_object(&Machine::new("ns", "m1", "gold").into()).await.unwrap();
        store.put_object(&Network::new("ns", "n1").into()).await.unwrap();

        let usage = aggregator
            .aggregate_usage("ns", &names(&["count/networks"]), None)
            .await
            .unwrap();
        assert_eq!(usage, resource_list! { "count/networks" => "1" });
    }

    #[tokio::test]
    async fn test_empty_namespace_reports_zeros() {
        let (_store, aggregator) = setup().await;
        let usage = aggregator
            .aggregate_usage("empty", &names(&["count/machines"]), None)
            .await
            .unwrap();
        assert_eq!(usage, resource_list! { "count/machines" => "0" });
    }

    #[tokio::test]
    async fn test_repeated_aggregation_is_stable() {
        let (store, aggregator) = setup().await;
        store.put_object(&Machine::new("ns", "m1", "gold").into()).await.unwrap();
        store.put_object(&Machine::new("ns", "m2", "silver").into()).await.unwrap();
        let tracked = names(&["count/machines", "requests.cpu"]);

        let first = aggregator.aggregate_usage("ns", &tracked, None).await.unwrap();
        let second = aggregator.aggregate_usage("ns", &tracked, None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dangling_class_counts_only_the_object() {
        let (store, aggregator) = setup().await;
        store.put_object(&Machine::new("ns", "m1", "missing").into()).await.unwrap();
        store.put_object(&Machine::new("ns", "m2", "gold").into()).await.unwrap();
        let usage = aggregator
            .aggregate_usage("ns", &names(&["count/machines", "requests.cpu"]), None)
            .await
            .unwrap();
        assert_eq!(usage, resource_list! { "count/machines" => "2", "requests.cpu" => "4" });
    }
}
