//! The per-named-queue state machine: enqueue, claim, mark-done, mark-reset,
//! reap expired claims, remove entire queue.

use crate::error::ZakuError;
use crate::store::{Store, StoreError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use zaku_protocol::Value;

/// Bounded attempts for a single backing-store call, counting the first try.
const MAX_STORE_ATTEMPTS: u32 = 4;
/// Doubles after each retry: 20ms, 40ms, 80ms.
const STORE_RETRY_BASE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Claimed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub id: String,
    pub status: TaskStatus,
    pub created_at_ms: i64,
    pub claimed_at_ms: Option<i64>,
    pub ttl_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClaimEntry {
    deadline_ms: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// Claim/meta/pending documents keyed per queue, plus the root index of
/// known queue names, all under one namespace prefix.
pub struct QueueEngine {
    store: Arc<dyn Store>,
    prefix: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QueueEngine {
    pub fn new(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        QueueEngine {
            store,
            prefix: prefix.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_pending(&self, queue: &str) -> String {
        format!("{}:queue:{}:pending", self.prefix, queue)
    }

    fn key_claims(&self, queue: &str) -> String {
        format!("{}:queue:{}:claims", self.prefix, queue)
    }

    fn key_meta(&self, queue: &str) -> String {
        format!("{}:queue:{}:meta", self.prefix, queue)
    }

    fn key_queues(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    /// The backing store offers no cross-key transaction, so each queue's
    /// compound read-modify-write operations are serialized through a
    /// per-queue lock. This is stronger than the compare-and-set loop a
    /// transactional store would need, but it satisfies the same contract:
    /// no two concurrent `take`s on one queue ever return the same id.
    async fn lock_for(&self, queue: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(queue.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Retries a backing-store call on transient `StoreError::Unavailable`
    /// with exponential backoff, bounded at `MAX_STORE_ATTEMPTS` attempts,
    /// before surfacing `ZakuError::BackingStoreUnavailable`.
    /// `StoreError::Malformed` is never retried — corrupted data a store
    /// already returned won't un-corrupt itself on the next attempt — and
    /// surfaces immediately as `ZakuError::Internal`.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, ZakuError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(StoreError::Malformed(msg)) => {
                    return Err(ZakuError::Internal(format!("{op}: malformed data: {msg}")));
                }
                Err(StoreError::Unavailable(msg)) if attempt < MAX_STORE_ATTEMPTS => {
                    let backoff = STORE_RETRY_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        op,
                        attempt,
                        error = %msg,
                        backoff_ms = backoff.as_millis() as u64,
                        "backing-store call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(StoreError::Unavailable(msg)) => {
                    return Err(ZakuError::BackingStoreUnavailable(msg));
                }
            }
        }
    }

    async fn read_claims(&self, queue: &str) -> Result<HashMap<String, ClaimEntry>, ZakuError> {
        let key = self.key_claims(queue);
        let doc = self
            .with_retry("doc_get(claims)", || self.store.doc_get(&key))
            .await?;
        match doc {
            None => Ok(HashMap::new()),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| ZakuError::Internal(format!("malformed claims document: {e}"))),
        }
    }

    async fn write_claims(
        &self,
        queue: &str,
        claims: &HashMap<String, ClaimEntry>,
    ) -> Result<(), ZakuError> {
        let v = serde_json::to_value(claims)
            .map_err(|e| ZakuError::Internal(format!("claims serialize: {e}")))?;
        let key = self.key_claims(queue);
        self.with_retry("doc_set(claims)", || self.store.doc_set(&key, &v))
            .await
    }

    async fn read_meta(&self, queue: &str) -> Result<HashMap<String, TaskMeta>, ZakuError> {
        let key = self.key_meta(queue);
        let doc = self
            .with_retry("doc_get(meta)", || self.store.doc_get(&key))
            .await?;
        match doc {
            None => Ok(HashMap::new()),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| ZakuError::Internal(format!("malformed meta document: {e}"))),
        }
    }

    async fn write_meta(
        &self,
        queue: &str,
        meta: &HashMap<String, TaskMeta>,
    ) -> Result<(), ZakuError> {
        let v = serde_json::to_value(meta)
            .map_err(|e| ZakuError::Internal(format!("meta serialize: {e}")))?;
        let key = self.key_meta(queue);
        self.with_retry("doc_set(meta)", || self.store.doc_set(&key, &v))
            .await
    }

    /// Idempotent creation; succeeds even if the queue is already present.
    pub async fn init_queue(&self, queue: &str) -> Result<(), ZakuError> {
        let key = self.key_queues();
        self.with_retry("set_add(queues)", || self.store.set_add(&key, queue))
            .await
    }

    pub async fn list_queues(&self) -> Result<Vec<String>, ZakuError> {
        let key = self.key_queues();
        self.with_retry("set_members(queues)", || self.store.set_members(&key))
            .await
    }

    pub async fn clear_queue(&self, queue: &str) -> Result<(), ZakuError> {
        let lock = self.lock_for(queue).await;
        let _guard = lock.lock().await;
        let key = self.key_pending(queue);
        self.with_retry("list_delete(pending)", || self.store.list_delete(&key))
            .await?;
        self.write_claims(queue, &HashMap::new()).await?;
        self.write_meta(queue, &HashMap::new()).await?;
        Ok(())
    }

    pub async fn remove_queue(&self, queue: &str) -> Result<(), ZakuError> {
        self.clear_queue(queue).await?;
        let key = self.key_queues();
        self.with_retry("set_remove(queues)", || self.store.set_remove(&key, queue))
            .await
    }

    /// Appends to pending; mints a UUIDv4 if `task_id` is omitted. Fails
    /// with `Conflict` if `task_id` already names a task in this queue.
    pub async fn add(
        &self,
        queue: &str,
        payload: &Value,
        task_id: Option<String>,
    ) -> Result<String, ZakuError> {
        self.init_queue(queue).await?;
        let lock = self.lock_for(queue).await;
        let _guard = lock.lock().await;

        let mut meta = self.read_meta(queue).await?;
        let claims = self.read_claims(queue).await?;
        let id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if meta.contains_key(&id) || claims.contains_key(&id) {
            return Err(ZakuError::Conflict(id));
        }

        let encoded = zaku_protocol::encode(payload);
        self.store
            .doc_set(
                &format!("{}:queue:{}:payload:{}", self.prefix, queue, id),
                &JsonValue::String(BASE64.encode(encoded)),
            )
            .await
            .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))?;

        meta.insert(
            id.clone(),
            TaskMeta {
                id: id.clone(),
                status: TaskStatus::Pending,
                created_at_ms: now_ms(),
                claimed_at_ms: None,
                ttl_seconds: 0.0,
            },
        );
        self.write_meta(queue, &meta).await?;
        self.store
            .list_push_back(&self.key_pending(queue), &id)
            .await
            .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))?;
        Ok(id)
    }

    async fn payload_key(&self, queue: &str, task_id: &str) -> String {
        format!("{}:queue:{}:payload:{}", self.prefix, queue, task_id)
    }

    async fn load_payload(&self, queue: &str, task_id: &str) -> Result<Value, ZakuError> {
        let key = self.payload_key(queue, task_id).await;
        let doc = self
            .store
            .doc_get(&key)
            .await
            .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))?
            .ok_or_else(|| ZakuError::Internal(format!("payload missing for task {task_id}")))?;
        let b64 = doc
            .as_str()
            .ok_or_else(|| ZakuError::Internal("payload document is not a string".into()))?;
        let raw = BASE64
            .decode(b64)
            .map_err(|e| ZakuError::Internal(format!("payload base64: {e}")))?;
        zaku_protocol::decode(&raw).map_err(|e| ZakuError::Internal(format!("payload codec: {e}")))
    }

    /// Pops the oldest pending id and claims it with deadline `now + ttl`.
    /// Returns `None` if the queue is empty.
    pub async fn take(
        &self,
        queue: &str,
        ttl_seconds: f64,
    ) -> Result<Option<(String, Value)>, ZakuError> {
        let lock = self.lock_for(queue).await;
        let _guard = lock.lock().await;

        let Some(task_id) = self
            .store
            .list_pop_front(&self.key_pending(queue))
            .await
            .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))?
        else {
            return Ok(None);
        };

        let payload = self.load_payload(queue, &task_id).await?;

        let mut claims = self.read_claims(queue).await?;
        claims.insert(
            task_id.clone(),
            ClaimEntry {
                deadline_ms: now_ms() + (ttl_seconds * 1000.0) as i64,
            },
        );
        self.write_claims(queue, &claims).await?;

        let mut meta = self.read_meta(queue).await?;
        if let Some(m) = meta.get_mut(&task_id) {
            m.status = TaskStatus::Claimed;
            m.claimed_at_ms = Some(now_ms());
            m.ttl_seconds = ttl_seconds;
        }
        self.write_meta(queue, &meta).await?;

        Ok(Some((task_id, payload)))
    }

    /// Removes the claim entry and metadata. No-op-success if already absent.
    pub async fn mark_done(&self, queue: &str, task_id: &str) -> Result<(), ZakuError> {
        let lock = self.lock_for(queue).await;
        let _guard = lock.lock().await;

        let mut claims = self.read_claims(queue).await?;
        claims.remove(task_id);
        self.write_claims(queue, &claims).await?;

        let mut meta = self.read_meta(queue).await?;
        meta.remove(task_id);
        self.write_meta(queue, &meta).await?;

        self.store
            .doc_delete(&self.payload_key(queue, task_id).await)
            .await
            .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))
    }

    /// Removes the claim entry and re-inserts at the tail of pending.
    /// No-op-success if the task isn't currently claimed.
    pub async fn mark_reset(&self, queue: &str, task_id: &str) -> Result<(), ZakuError> {
        let lock = self.lock_for(queue).await;
        let _guard = lock.lock().await;

        let mut claims = self.read_claims(queue).await?;
        if claims.remove(task_id).is_none() {
            return Ok(());
        }
        self.write_claims(queue, &claims).await?;

        let mut meta = self.read_meta(queue).await?;
        if let Some(m) = meta.get_mut(task_id) {
            m.status = TaskStatus::Pending;
            m.claimed_at_ms = None;
        }
        self.write_meta(queue, &meta).await?;

        self.store
            .list_push_back(&self.key_pending(queue), task_id)
            .await
            .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))
    }

    /// One reaper tick for a single queue: scan the claim set and revert any
    /// entry whose deadline has elapsed, re-appending it to pending's tail.
    /// Re-reads the deadline after acquiring the lock so a `mark_done` that
    /// raced the reaper wins.
    pub async fn reap(&self, queue: &str) -> Result<usize, ZakuError> {
        let lock = self.lock_for(queue).await;
        let _guard = lock.lock().await;

        let mut claims = self.read_claims(queue).await?;
        let now = now_ms();
        let expired: Vec<String> = claims
            .iter()
            .filter(|(_, entry)| entry.deadline_ms <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut meta = self.read_meta(queue).await?;
        for task_id in &expired {
            claims.remove(task_id);
            if let Some(m) = meta.get_mut(task_id) {
                m.status = TaskStatus::Pending;
                m.claimed_at_ms = None;
            }
            self.store
                .list_push_back(&self.key_pending(queue), task_id)
                .await
                .map_err(|e| ZakuError::BackingStoreUnavailable(e.to_string()))?;
            warn!(queue, task_id, "reaped expired claim");
        }
        self.write_claims(queue, &claims).await?;
        self.write_meta(queue, &meta).await?;
        info!(queue, count = expired.len(), "reaper swept expired claims");
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> QueueEngine {
        QueueEngine::new(Arc::new(MemoryStore::new()), "zaku")
    }

    #[tokio::test]
    async fn empty_take_returns_none_without_error() {
        let e = engine();
        e.init_queue("q1").await.unwrap();
        assert!(e.take("q1", 30.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fifo_single_claimant() {
        let e = engine();
        let x = e
            .add("q1", &Value::Map(vec![("a".into(), Value::Int(1))]), None)
            .await
            .unwrap();
        let y = e
            .add("q1", &Value::Map(vec![("a".into(), Value::Int(2))]), None)
            .await
            .unwrap();

        let (id, payload) = e.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(id, x);
        assert_eq!(payload, Value::Map(vec![("a".into(), Value::Int(1))]));

        let (id, payload) = e.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(id, y);
        assert_eq!(payload, Value::Map(vec![("a".into(), Value::Int(2))]));

        assert!(e.take("q1", 30.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_requeues_at_tail() {
        let e = engine();
        let a = e.add("q1", &Value::Null, None).await.unwrap();
        let b = e.add("q1", &Value::Null, None).await.unwrap();
        let (taken_a, _) = e.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(taken_a, a);

        e.mark_reset("q1", &a).await.unwrap();

        let (first, _) = e.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(first, b);
        let (second, _) = e.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(second, a);
    }

    #[tokio::test]
    async fn explicit_id_collision_is_a_conflict() {
        let e = engine();
        e.add("q1", &Value::Null, Some("key=5".to_owned()))
            .await
            .unwrap();
        let err = e
            .add("q1", &Value::Null, Some("key=5".to_owned()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), zaku_protocol::error_codes::CONFLICT);
    }

    #[tokio::test]
    async fn mark_done_and_mark_reset_are_idempotent_when_absent() {
        let e = engine();
        e.mark_done("q1", "ghost").await.unwrap();
        e.mark_reset("q1", "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn ttl_reap_returns_task_to_pending() {
        let e = engine();
        let x = e.add("q1", &Value::Null, None).await.unwrap();
        e.take("q1", 0.0).await.unwrap();
        let reaped = e.reap("q1").await.unwrap();
        assert_eq!(reaped, 1);
        let (id, _) = e.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(id, x);
    }
}
