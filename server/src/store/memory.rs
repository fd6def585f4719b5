use super::{Store, StoreError};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

/// Process-local backing store, default for local development and the whole
/// test suite. Same shape as a registry behind an `RwLock`: one map per
/// primitive kind, guarded independently.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, JsonValue>>,
    lists: RwLock<HashMap<String, VecDeque<String>>>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn doc_get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn doc_set(&self, key: &str, value: &JsonValue) -> Result<(), StoreError> {
        self.docs
            .write()
            .await
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn doc_delete(&self, key: &str) -> Result<(), StoreError> {
        self.docs.write().await.remove(key);
        Ok(())
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lists
            .write()
            .await
            .entry(key.to_owned())
            .or_default()
            .push_back(value.to_owned());
        Ok(())
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lists
            .write()
            .await
            .entry(key.to_owned())
            .or_default()
            .push_front(value.to_owned());
        Ok(())
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lists
            .write()
            .await
            .get_mut(key)
            .and_then(VecDeque::pop_front))
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lists
            .read()
            .await
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_delete(&self, key: &str) -> Result<(), StoreError> {
        self.lists.write().await.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.sets
            .write()
            .await
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(set) = self.sets.write().await.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_list_preserves_fifo_order() {
        let store = MemoryStore::new();
        store.list_push_back("q:pending", "a").await.unwrap();
        store.list_push_back("q:pending", "b").await.unwrap();
        assert_eq!(
            store.list_pop_front("q:pending").await.unwrap(),
            Some("a".to_owned())
        );
        assert_eq!(
            store.list_all("q:pending").await.unwrap(),
            vec!["b".to_owned()]
        );
    }

    #[tokio::test]
    async fn reaper_reinsertion_goes_to_the_tail() {
        let store = MemoryStore::new();
        store.list_push_back("q:pending", "b").await.unwrap();
        store.list_push_back("q:pending", "a").await.unwrap();
        store.list_pop_front("q:pending").await.unwrap();
        store.list_push_back("q:pending", "a").await.unwrap();
        assert_eq!(
            store.list_all("q:pending").await.unwrap(),
            vec!["a".to_owned(), "a".to_owned()]
        );
    }

    #[tokio::test]
    async fn queue_set_tracks_membership() {
        let store = MemoryStore::new();
        store.set_add("queues", "q1").await.unwrap();
        store.set_add("queues", "q2").await.unwrap();
        store.set_remove("queues", "q1").await.unwrap();
        assert_eq!(store.set_members("queues").await.unwrap(), vec!["q2"]);
    }
}
