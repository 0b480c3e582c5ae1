use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use pkg_constants::state::{MACHINE_CLASSES_PREFIX, RESOURCE_QUOTAS_PREFIX, VOLUME_CLASSES_PREFIX};
use pkg_state::{CasOutcome, ObjectStore};
use pkg_types::machine::MachineClass;
use pkg_types::object::{ObjectKind, TrackedObject};
use pkg_types::quota::ResourceQuota;
use pkg_types::resource::ResourceList;
use pkg_types::volume::VolumeClass;

pub fn quota_key(namespace: &str, name: &str) -> String {
    format!("{}{}/{}", RESOURCE_QUOTAS_PREFIX, namespace, name)
}

/// Typed access to quotas, tracked objects and classes on top of an [`ObjectStore`].
#[derive(Clone)]
pub struct QuotaStore {
    inner: Arc<dyn ObjectStore>,
}

impl QuotaStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<(T, u64)>> {
        match self.inner.get(key).await? {
            Some(record) => {
                let value = serde_json::from_slice(&record.value)
                    .map_err(|e| anyhow::anyhow!("Failed to decode {}: {}", key, e))?;
                Ok(Some((value, record.revision)))
            }
            None => Ok(None),
        }
    }

    /// Decodes every record under `prefix`. A single undecodable record fails the listing.
    pub async fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> anyhow::Result<Vec<(T, u64)>> {
        let entries = self.inner.list_prefix(prefix).await?;
        entries
            .into_iter()
            .map(|(key, record)| {
                let value = serde_json::from_slice(&record.value)
                    .map_err(|e| anyhow::anyhow!("Failed to decode {}: {}", key, e))?;
                Ok((value, record.revision))
            })
            .collect()
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<u64> {
        let data = serde_json::to_vec(value)?;
        self.inner.put(key, &data).await
    }

    // --- Quotas ---

    /// All quotas in `namespace`, ordered by name, each stamped with its revision.
    pub async fn list_quotas(&self, namespace: &str) -> anyhow::Result<Vec<ResourceQuota>> {
        let prefix = format!("{}{}/", RESOURCE_QUOTAS_PREFIX, namespace);
        self.list_quotas_under(&prefix).await
    }

    /// Every quota in every namespace.
    pub async fn list_all_quotas(&self) -> anyhow::Result<Vec<ResourceQuota>> {
        self.list_quotas_under(RESOURCE_QUOTAS_PREFIX).await
    }

    async fn list_quotas_under(&self, prefix: &str) -> anyhow::Result<Vec<ResourceQuota>> {
        Ok(self
            .list_json::<ResourceQuota>(prefix)
            .await?
            .into_iter()
            .map(|(mut quota, revision)| {
                quota.resource_version = revision;
                quota
            })
            .collect())
    }

    pub async fn get_quota(&self, namespace: &str, name: &str) -> anyhow::Result<Option<ResourceQuota>> {
        Ok(self
            .get_json::<ResourceQuota>(&quota_key(namespace, name))
            .await?
            .map(|(mut quota, revision)| {
                quota.resource_version = revision;
                quota
            }))
    }

    /// Store a new quota with empty usage. Fails if one with the same name already exists.
    pub async fn create_quota(&self, quota: &ResourceQuota) -> anyhow::Result<ResourceQuota> {
        quota.validate()?;
        let mut created = quota.clone();
        created.used = ResourceList::new();
        created.resource_version = 0;
        let key = quota_key(&created.namespace, &created.name);
        let data = serde_json::to_vec(&created)?;
        match self.inner.compare_and_swap(&key, &data, 0).await? {
            CasOutcome::Committed { revision } => {
                created.resource_version = revision;
                Ok(created)
            }
            CasOutcome::Conflict { .. } => {
                anyhow::bail!("quota {}/{} already exists", quota.namespace, quota.name)
            }
        }
    }

    /// Conditionally write `quota`, keyed on its `resource_version`.
    pub async fn update_quota(&self, quota: &ResourceQuota) -> anyhow::Result<CasOutcome> {
        let key = quota_key(&quota.namespace, &quota.name);
        let data = serde_json::to_vec(quota)?;
        self.inner
            .compare_and_swap(&key, &data, quota.resource_version)
            .await
    }

    pub async fn delete_quota(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.inner.delete(&quota_key(namespace, name)).await
    }

    // --- Tracked objects ---

    pub async fn put_object(&self, object: &TrackedObject) -> anyhow::Result<u64> {
        self.put_json(&object.store_key(), object).await
    }

    pub async fn delete_object(&self, object: &TrackedObject) -> anyhow::Result<()> {
        self.inner.delete(&object.store_key()).await
    }

    /// Objects of `kind` stored in `namespace`.
    pub async fn list_objects(&self, namespace: &str, kind: ObjectKind) -> anyhow::Result<Vec<TrackedObject>> {
        Ok(self
            .list_json::<TrackedObject>(&kind.namespace_prefix(namespace))
            .await?
            .into_iter()
            .map(|(object, _)| object)
            .filter(|object| object.kind() == kind)
            .collect())
    }

    // --- Classes ---

    pub async fn put_machine_class(&self, class: &MachineClass) -> anyhow::Result<u64> {
        self.put_json(&format!("{}{}", MACHINE_CLASSES_PREFIX, class.name), class)
            .await
    }

    pub async fn put_volume_class(&self, class: &VolumeClass) -> anyhow::Result<u64> {
        self.put_json(&format!("{}{}", VOLUME_CLASSES_PREFIX, class.name), class)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::MemoryStore;
    use pkg_types::machine::Machine;
    use pkg_types::network::Network;
    use pkg_types::resource_list;

    fn store() -> QuotaStore {
        QuotaStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_then_update_with_stale_version_conflicts() {
        let store = store();
        let quota = ResourceQuota::new("ns", "q", resource_list! { "count/machines" => "5" });
        let created = store.create_quota(&quota).await.unwrap();
        assert!(created.resource_version > 0);
        assert!(store.create_quota(&quota).await.is_err());

        let mut first = created.clone();
        first.used = resource_list! { "count/machines" => "1" };
        assert!(matches!(
            store.update_quota(&first).await.unwrap(),
            CasOutcome::Committed { .. }
        ));

        let mut stale = created;
        stale.used = resource_list! { "count/machines" => "2" };
        assert!(matches!(
            store.update_quota(&stale).await.unwrap(),
            CasOutcome::Conflict { .. }
        ));

        let fresh = store.get_quota("ns", "q").await.unwrap().unwrap();
        assert_eq!(fresh.used, resource_list! { "count/machines" => "1" });
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_quota() {
        let store = store();
        let quota = ResourceQuota::new("ns", "Bad_Name", resource_list! { "count/machines" => "5" });
        assert!(store.create_quota(&quota).await.is_err());
    }

    #[tokio::test]
    async fn test_list_objects_filters_by_kind_and_namespace() {
        let store = store();
        store
            .put_object(&Machine::new("a", "m1", "gold").into())
            .await
            .unwrap();
        store
            .put_object(&Machine::new("b", "m2", "gold").into())
            .await
            .unwrap();
        store.put_object(&Network::new("a", "n1").into()).await.unwrap();

        let machines = store.list_objects("a", ObjectKind::Machine).await.unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].name(), "m1");
    }

    #[tokio::test]
    async fn test_list_quotas_is_namespace_scoped() {
        let store = store();
        for (ns, name) in [("a", "q1"), ("a", "q2"), ("ab", "q3")] {
            store
                .create_quota(&ResourceQuota::new(ns, name, resource_list! { "count/volumes" => "1" }))
                .await
                .unwrap();
        }
        let names: Vec<_> = store
            .list_quotas("a")
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(names, vec!["q1", "q2"]);
        assert_eq!(store.list_all_quotas().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_undecodable_quota_fails_listing() {
        let backend = Arc::new(MemoryStore::new());
        let store = QuotaStore::new(backend.clone());
        store
            .create_quota(&ResourceQuota::new("ns", "good", resource_list! { "count/machines" => "1" }))
            .await
            .unwrap();
        backend
            .put(
                &quota_key("ns", "broken"),
                br#"{"hard":{"count/machines":"0","requests.cpu":"4 cores"}}"#,
            )
            .await
            .unwrap();

        let err = store.list_quotas("ns").await.unwrap_err();
        assert!(err.to_string().contains("/broken"), "{}", err);
        assert!(store.list_all_quotas().await.is_err());
    }

    #[tokio::test]
    async fn test_create_starts_with_empty_usage() {
        let store = store();
        let mut quota = ResourceQuota::new("ns", "q", resource_list! { "count/machines" => "5" });
        quota.used = resource_list! { "count/machines" => "3" };
        let created = store.create_quota(&quota).await.unwrap();
        assert!(created.used.is_empty());
        assert!(store.get_quota("ns", "q").await.unwrap().unwrap().used.is_empty());

        let mut negative = ResourceQuota::new("ns", "neg", resource_list! { "count/machines" => "5" });
        negative.used = resource_list! { "count/machines" => "-7" };
        assert!(store.create_quota(&negative).await.is_err());
        assert!(store.get_quota("ns", "neg").await.unwrap().is_none());
    }
}
