//! Storage port for dictionary and round state.
//!
//! The referee never keeps game state in process memory; everything lives behind
//! [`KeyValueStore`], a Redis-shaped interface. [`MemoryStore`] implements it for tests
//! and single-process play.

pub mod keys;
mod memory;
mod retry;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use memory::MemoryStore;
pub use retry::{read_with_retry, RetryPolicy};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Key '{key}' holds a value of the wrong type")]
    WrongType { key: String },

    #[error("Key '{key}' holds an invalid value: {value}")]
    InvalidValue { key: String, value: String },
}

impl StoreError {
    /// Whether retrying the same idempotent call might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// A single mutation inside a [`Batch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Set { key: String, value: String },
    Del { key: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    /// Overwrite `dest` with the union of `keys`
    SUnionStore { dest: String, keys: Vec<String> },
    /// Overwrite `dest` with the first key minus all others
    SDiffStore { dest: String, keys: Vec<String> },
    HSet { key: String, field: String, value: String },
    HDel { key: String, field: String },
}

/// Ordered list of mutations executed all-or-nothing by [`KeyValueStore::exec`]
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Op::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Op::Del { key: key.into() })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Op::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Op::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn sunionstore(&mut self, dest: impl Into<String>, keys: Vec<String>) -> &mut Self {
        self.push(Op::SUnionStore {
            dest: dest.into(),
            keys,
        })
    }

    pub fn sdiffstore(&mut self, dest: impl Into<String>, keys: Vec<String>) -> &mut Self {
        self.push(Op::SDiffStore {
            dest: dest.into(),
            keys,
        })
    }

    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Op::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn hdel(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.push(Op::HDel {
            key: key.into(),
            field: field.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Take the queued ops, leaving the batch empty for reuse
    pub fn take(&mut self) -> Batch {
        std::mem::take(self)
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    fn push(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }
}

/// Redis-shaped key-value store used by the dictionary and the referee.
///
/// Sets that become empty cease to exist, as in Redis: `exists` on an emptied set is false.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Increment an integer value (missing keys start at 0)
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Add a member, returning whether it was newly added
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove a member, returning whether it was present
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn scard(&self, key: &str) -> StoreResult<u64>;

    /// A uniformly random member, or `None` for a missing set
    async fn srandmember(&self, key: &str) -> StoreResult<Option<String>>;

    /// Iterate set members; a returned cursor of 0 means iteration is complete
    async fn sscan(&self, key: &str, cursor: u64, count: usize)
        -> StoreResult<(u64, Vec<String>)>;

    /// Iterate key names matching a glob pattern (`*` wildcards only)
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> StoreResult<(u64, Vec<String>)>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Apply a batch atomically: either every op is applied or none is
    async fn exec(&self, batch: Batch) -> StoreResult<()>;
}

/// Collect every key matching `pattern`, paging through `scan`
pub async fn scan_all(
    store: &dyn KeyValueStore,
    pattern: &str,
    page: usize,
) -> StoreResult<Vec<String>> {
    let mut found = Vec::new();
    let mut cursor = 0;
    loop {
        let (next, keys) = store.scan(cursor, pattern, page).await?;
        found.extend(keys);
        if next == 0 {
            return Ok(found);
        }
        cursor = next;
    }
}

/// Delete every key matching `pattern`, one batch per scanned page
pub async fn delete_matching(
    store: &dyn KeyValueStore,
    pattern: &str,
    page: usize,
) -> StoreResult<u64> {
    let keys = scan_all(store, pattern, page).await?;
    let mut deleted = 0;
    for chunk in keys.chunks(page.max(1)) {
        let mut batch = Batch::new();
        for key in chunk {
            batch.del(key.clone());
        }
        store.exec(batch).await?;
        deleted += chunk.len() as u64;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_builder_keeps_order() {
        let mut batch = Batch::new();
        batch.set("a", "1").sadd("s", "x").hdel("h", "f");

        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.ops()[0],
            Op::Set {
                key: "a".to_string(),
                value: "1".to_string()
            }
        );
        assert!(matches!(batch.ops()[2], Op::HDel { .. }));
    }

    #[test]
    fn test_batch_take_resets() {
        let mut batch = Batch::new();
        batch.del("a");
        let taken = batch.take();
        assert_eq!(taken.len(), 1);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_transient_errors() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!StoreError::WrongType { key: "k".into() }.is_transient());
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let store = MemoryStore::new();
        store.sadd("dict:tokenx:a", "a b").await.unwrap();
        store.sadd("dict:tokenx:b", "b c").await.unwrap();
        store.set("other", "1").await.unwrap();

        let deleted = delete_matching(&store, "dict:tokenx:*", 1).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.exists("other").await.unwrap());
        assert!(!store.exists("dict:tokenx:a").await.unwrap());
    }
}
