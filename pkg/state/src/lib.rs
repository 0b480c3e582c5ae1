//! Object store with per-record revisions and compare-and-swap writes.
//!
//! Every record carries the store revision at which it was last written.
//! Writers that must not lose concurrent updates read a record, then write it
//! back with [`ObjectStore::compare_and_swap`] conditioned on that revision.

use async_trait::async_trait;

pub mod client;
pub mod memory;

pub use client::StateStore;
pub use memory::MemoryStore;

/// A stored value together with the revision it was written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub revision: u64,
    pub value: Vec<u8>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed; the record now has `revision`.
    Committed { revision: u64 },
    /// The stored revision no longer matched. `current` is `None` when the key is gone.
    Conflict { current: Option<u64> },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Retrieve the record for a key, or `None` if it does not exist.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Versioned>>;

    /// All records whose keys start with `prefix`, in key order.
    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Versioned)>>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<u64>;

    /// Write only if the stored revision equals `expected_revision`.
    /// An `expected_revision` of 0 means the key must not exist yet.
    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        expected_revision: u64,
    ) -> anyhow::Result<CasOutcome>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}
