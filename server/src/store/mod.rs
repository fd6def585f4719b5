//! Backing-store adapter: the narrow interface the queue engine needs from a
//! key-value store offering JSON documents, ordered lists, and sets.
//!
//! Pub/sub is deliberately not part of this trait — the pub/sub fabric
//! (`crate::pubsub`) stays in-process, so no backing-store primitive for it
//! is ever exercised. See `DESIGN.md`.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("backing store returned malformed data: {0}")]
    Malformed(String),
}

/// set/get/delete of JSON documents, push/pop of ordered lists, and
/// membership sets, keyed by opaque string keys.
#[async_trait]
pub trait Store: Send + Sync {
    async fn doc_get(&self, key: &str) -> Result<Option<JsonValue>, StoreError>;
    async fn doc_set(&self, key: &str, value: &JsonValue) -> Result<(), StoreError>;
    async fn doc_delete(&self, key: &str) -> Result<(), StoreError>;

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn list_all(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn list_delete(&self, key: &str) -> Result<(), StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
