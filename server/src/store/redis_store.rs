use super::{Store, StoreError};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::Value as JsonValue;

/// Backing store over a real Redis (or Redis-compatible) server. JSON
/// documents are stored as `SET`/`GET` of a serialized value; ordered lists
/// use `LPUSH`/`RPUSH`/`LPOP`; sets use `SADD`/`SREM`/`SMEMBERS`.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(RedisStore { conn })
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn doc_get(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(unavailable)?;
        match raw {
            None => Ok(None),
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.to_string())),
        }
    }

    async fn doc_set(&self, key: &str, value: &JsonValue) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Malformed(e.to_string()))?;
        conn.set::<_, _, ()>(key, raw).await.map_err(unavailable)
    }

    async fn doc_delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value)
            .await
            .map_err(unavailable)
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, value)
            .await
            .map_err(unavailable)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.lpop(key, None).await.map_err(unavailable)
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, -1).await.map_err(unavailable)
    }

    async fn list_delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(unavailable)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(unavailable)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(unavailable)
    }
}
