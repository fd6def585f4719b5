//! Topic-indexed subscriber registry. Kept in-process rather than round
//! tripped through the backing store: a single-process server has no need
//! for cross-process fan-out, and the source leaves that case unspecified.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::warn;
use zaku_protocol::Value;

const TOPIC_CHANNEL_CAPACITY: usize = 1024;

type TopicBroadcast = broadcast::Sender<Value>;
type TopicRegistry = Arc<RwLock<HashMap<String, TopicBroadcast>>>;

/// Topics are created on first publish or subscribe and vanish once the
/// last subscriber drops its receiver; they hold no history.
#[derive(Clone, Default)]
pub struct PubSub {
    topics: TopicRegistry,
}

/// A live subscription. Sees only events published after it was created.
/// Dropping it (on unsubscribe, idle timeout, or connection teardown)
/// releases the fabric's reference to this receiver, tearing the topic
/// down if nobody else is listening.
pub struct Subscription {
    topic: String,
    pubsub: PubSub,
    rx: broadcast::Receiver<Value>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<Value, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let pubsub = self.pubsub.clone();
        let topic = std::mem::take(&mut self.topic);
        tokio::spawn(async move {
            pubsub.release(&topic).await;
        });
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_create(&self, topic: &str) -> TopicBroadcast {
        {
            let topics = self.topics.read().await;
            if let Some(tx) = topics.get(topic) {
                return tx.clone();
            }
        }
        let mut topics = self.topics.write().await;
        if let Some(tx) = topics.get(topic) {
            return tx.clone();
        }
        let (tx, _rx) = broadcast::channel(TOPIC_CHANNEL_CAPACITY);
        topics.insert(topic.to_owned(), tx.clone());
        tx
    }

    /// Drops `topic` from the registry once its sender has no subscribers
    /// left. A subscribe racing in right after this check simply recreates
    /// the topic via `get_or_create`; no events are lost since a fresh
    /// subscriber only ever expects events published after it subscribes.
    async fn release(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if topics.get(topic).is_some_and(|tx| tx.receiver_count() == 0) {
            topics.remove(topic);
        }
    }

    /// Subscribe to a topic, creating it if absent. The returned
    /// subscription sees only events published after this call.
    pub async fn subscribe(&self, topic: &str) -> Subscription {
        let rx = self.get_or_create(topic).await.subscribe();
        Subscription {
            topic: topic.to_owned(),
            pubsub: self.clone(),
            rx,
        }
    }

    /// Broadcasts to all current subscribers; returns the number of
    /// receivers the fabric attempted delivery to. Non-blocking: a
    /// subscriber whose channel is lagging or closed is simply not counted,
    /// matching the documented at-most-once semantics.
    pub async fn publish(&self, topic: &str, payload: Value) -> usize {
        let tx = self.get_or_create(topic).await;
        match tx.send(payload) {
            Ok(n) => n,
            Err(_) => {
                warn!(topic, "publish had no subscribers");
                0
            }
        }
    }

    #[cfg(test)]
    async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_after_publish_never_sees_the_stale_event() {
        let fabric = PubSub::new();
        fabric.publish("t1", Value::Int(1)).await;
        let mut rx = fabric.subscribe("t1").await;
        fabric.publish("t1", Value::Int(2)).await;
        assert_eq!(rx.recv().await.unwrap(), Value::Int(2));
    }

    #[tokio::test]
    async fn publish_reaches_all_current_subscribers() {
        let fabric = PubSub::new();
        let mut a = fabric.subscribe("t1").await;
        let mut b = fabric.subscribe("t1").await;
        let delivered = fabric.publish("t1", Value::Bool(true)).await;
        assert_eq!(delivered, 2);
        assert_eq!(a.recv().await.unwrap(), Value::Bool(true));
        assert_eq!(b.recv().await.unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn topic_vanishes_once_the_last_subscriber_drops() {
        let fabric = PubSub::new();
        let a = fabric.subscribe("t1").await;
        let b = fabric.subscribe("t1").await;
        assert_eq!(fabric.topic_count().await, 1);

        drop(a);
        // Cleanup runs in a spawned task; give the scheduler a turn.
        tokio::task::yield_now().await;
        assert_eq!(fabric.topic_count().await, 1, "one subscriber remains");

        drop(b);
        tokio::task::yield_now().await;
        for _ in 0..50 {
            if fabric.topic_count().await == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("topic was not removed after its last subscriber dropped");
    }
}
