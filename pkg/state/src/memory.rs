use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{CasOutcome, ObjectStore, Versioned};

/// In-process store with the same revision and CAS semantics as [`crate::StateStore`].
/// Used for tests and for running without a data directory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    revision: u64,
    records: BTreeMap<String, Versioned>,
}

impl MemoryStoreInner {
    fn write(&mut self, key: &str, value: &[u8]) -> u64 {
        self.revision += 1;
        self.records.insert(
            key.to_string(),
            Versioned {
                revision: self.revision,
                value: value.to_vec(),
            },
        );
        self.revision
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Versioned>> {
        Ok(self.inner.read().await.records.get(key).cloned())
    }

    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Versioned)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<u64> {
        Ok(self.inner.write().await.write(key, value))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        expected_revision: u64,
    ) -> anyhow::Result<CasOutcome> {
        let mut inner = self.inner.write().await;
        let current = inner.records.get(key).map(|r| r.revision);
        if current.unwrap_or(0) != expected_revision {
            return Ok(CasOutcome::Conflict { current });
        }
        let revision = inner.write(key, value);
        Ok(CasOutcome::Committed { revision })
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.write().await.records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revisions_increase_monotonically() {
        let store = MemoryStore::new();
        let r1 = store.put("/registry/a", b"1").await.unwrap();
        let r2 = store.put("/registry/b", b"2").await.unwrap();
        let r3 = store.put("/registry/a", b"3").await.unwrap();
        assert!(r1 < r2 && r2 < r3);
        assert_eq!(store.get("/registry/a").await.unwrap().unwrap().revision, r3);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_revision() {
        let store = MemoryStore::new();
        let rev = store.put("/registry/q", b"v1").await.unwrap();

        let first = store.compare_and_swap("/registry/q", b"v2", rev).await.unwrap();
        let CasOutcome::Committed { revision } = first else {
            panic!("first CAS should commit, got {:?}", first);
        };
        assert!(revision > rev);

        let stale = store.compare_and_swap("/registry/q", b"v3", rev).await.unwrap();
        assert_eq!(stale, CasOutcome::Conflict { current: Some(revision) });
        assert_eq!(store.get("/registry/q").await.unwrap().unwrap().value, b"v2");
    }

    #[tokio::test]
    async fn test_cas_with_zero_creates_only_missing_keys() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.compare_and_swap("/registry/n", b"x", 0).await.unwrap(),
            CasOutcome::Committed { .. }
        ));
        assert!(matches!(
            store.compare_and_swap("/registry/n", b"y", 0).await.unwrap(),
            CasOutcome::Conflict { current: Some(_) }
        ));
    }

    #[tokio::test]
    async fn test_cas_on_deleted_key_conflicts() {
        let store = MemoryStore::new();
        let rev = store.put("/registry/gone", b"x").await.unwrap();
        store.delete("/registry/gone").await.unwrap();
        assert_eq!(
            store.compare_and_swap("/registry/gone", b"y", rev).await.unwrap(),
            CasOutcome::Conflict { current: None }
        );
    }

    #[tokio::test]
    async fn test_list_prefix_is_bounded() {
        let store = MemoryStore::new();
        store.put("/registry/machines/a/m1", b"1").await.unwrap();
        store.put("/registry/machines/a/m2", b"2").await.unwrap();
        store.put("/registry/machines/ab/m3", b"3").await.unwrap();
        store.put("/registry/volumes/a/v1", b"4").await.unwrap();

        let listed = store.list_prefix("/registry/machines/a/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/registry/machines/a/m1", "/registry/machines/a/m2"]);
    }
}
