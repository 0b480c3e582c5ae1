use async_trait::async_trait;
use slatedb::Db;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{CasOutcome, ObjectStore, Versioned};
use pkg_constants::state::REVISION_COUNTER_KEY;

/// Width of the big-endian revision header in front of every stored value.
const REVISION_HEADER_LEN: usize = 8;

/// Persistent state store backed by SlateDB on a local filesystem.
///
/// SlateDB admits a single writer per database, so conditional writes are
/// serialized by `write_lock` inside this process. The revision counter is
/// persisted before the record it stamps, so a stored revision never exceeds
/// the counter after a restart.
#[derive(Clone)]
pub struct StateStore {
    db: Db,
    revision: Arc<AtomicU64>,
    write_lock: Arc<Mutex<()>>,
}

fn encode_record(revision: u64, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REVISION_HEADER_LEN + value.len());
    buf.extend_from_slice(&revision.to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

fn decode_record(key: &str, bytes: &[u8]) -> anyhow::Result<Versioned> {
    if bytes.len() < REVISION_HEADER_LEN {
        anyhow::bail!("record {} is truncated ({} bytes)", key, bytes.len());
    }
    let (header, value) = bytes.split_at(REVISION_HEADER_LEN);
    let mut rev = [0u8; REVISION_HEADER_LEN];
    rev.copy_from_slice(header);
    Ok(Versioned {
        revision: u64::from_be_bytes(rev),
        value: value.to_vec(),
    })
}

impl StateStore {
    /// Open (or create) a state store rooted at `path` on the local filesystem.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        info!("Opening SlateDB state store at {}", path);

        // Ensure the data directory exists before opening the object store
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

        let object_store = Arc::new(
            LocalFileSystem::new_with_prefix(path)
                .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
        );
        let db = Db::open(Path::from("/"), object_store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open SlateDB: {}", e))?;

        let revision = match db.get(REVISION_COUNTER_KEY.as_bytes()).await {
            Ok(Some(bytes)) if bytes.len() == REVISION_HEADER_LEN => {
                let mut rev = [0u8; REVISION_HEADER_LEN];
                rev.copy_from_slice(&bytes);
                u64::from_be_bytes(rev)
            }
            Ok(_) => 0,
            Err(e) => return Err(anyhow::anyhow!("SlateDB get failed: {}", e)),
        };
        info!("State store revision is {}", revision);

        Ok(Self {
            db,
            revision: Arc::new(AtomicU64::new(revision)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Allocate the next revision and persist the counter. Caller holds `write_lock`.
    async fn next_revision(&self) -> anyhow::Result<u64> {
        let next = self.revision.load(Ordering::SeqCst) + 1;
        self.db
            .put(REVISION_COUNTER_KEY.as_bytes(), &next.to_be_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB put failed: {}", e))?;
        self.revision.store(next, Ordering::SeqCst);
        Ok(next)
    }

    async fn write_record(&self, key: &str, value: &[u8]) -> anyhow::Result<u64> {
        let revision = self.next_revision().await?;
        self.db
            .put(key.as_bytes(), &encode_record(revision, value))
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB put failed: {}", e))?;
        Ok(revision)
    }

    /// Gracefully close the state store.
    pub async fn close(self) -> anyhow::Result<()> {
        info!("Closing SlateDB state store");
        self.db
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB close failed: {}", e))
    }
}

#[async_trait]
impl ObjectStore for StateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Versioned>> {
        match self.db.get(key.as_bytes()).await {
            Ok(Some(bytes)) => Ok(Some(decode_record(key, &bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("SlateDB get failed: {}", e)),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Versioned)>> {
        let mut results = Vec::new();
        let mut iter = self
            .db
            .scan_prefix(prefix.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB scan_prefix failed: {}", e))?;

        while let Some(kv) = iter
            .next()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB scan failed: {}", e))?
        {
            let key = String::from_utf8_lossy(&kv.key).to_string();
            let record = decode_record(&key, &kv.value)?;
            results.push((key, record));
        }
        Ok(results)
    }

    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        self.write_record(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        expected_revision: u64,
    ) -> anyhow::Result<CasOutcome> {
        let _guard = self.write_lock.lock().await;
        let current = self.get(key).await?.map(|r| r.revision);
        if current.unwrap_or(0) != expected_revision {
            debug!(
                "CAS conflict on {} (expected={}, current={:?})",
                key, expected_revision, current
            );
            return Ok(CasOutcome::Conflict { current });
        }
        let revision = self.write_record(key, value).await?;
        Ok(CasOutcome::Committed { revision })
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.db
            .delete(key.as_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB delete failed: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_header_round_trip() {
        let encoded = encode_record(42, b"payload");
        let decoded = decode_record("k", &encoded).unwrap();
        assert_eq!(decoded.revision, 42);
        assert_eq!(decoded.value, b"payload");
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        assert!(decode_record("k", &[0, 1, 2]).is_err());
    }

    fn scratch_dir(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("quotad-state-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_list_prefix_returns_every_record() {
        let dir = scratch_dir("list");
        let store = StateStore::new(&dir).await.unwrap();
        for i in 0..20 {
            store.put(&format!("/items/{:02}", i), b"v").await.unwrap();
        }
        store.put("/other/x", b"v").await.unwrap();

        let listed = store.list_prefix("/items/").await.unwrap();
        assert_eq!(listed.len(), 20);
        assert!(listed.iter().all(|(k, _)| k.starts_with("/items/")));

        store.close().await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_list_prefix_surfaces_bad_records() {
        let dir = scratch_dir("bad");
        let store = StateStore::new(&dir).await.unwrap();
        store.put("/items/a", b"v").await.unwrap();
        store.db.put(b"/items/b", &[1, 2]).await.unwrap();

        let err = store.list_prefix("/items/").await.unwrap_err();
        assert!(err.to_string().contains("/items/b"), "{}", err);

        store.close().await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
