//! Background task scanning claimed entries and reverting those whose TTL
//! has elapsed.

use crate::queue::QueueEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Runs reap ticks on `period` until the returned task is dropped or
/// aborted. One tick iterates every known queue name.
pub fn spawn(engine: Arc<QueueEngine>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match engine.list_queues().await {
                Ok(queues) => {
                    for queue in queues {
                        if let Err(e) = engine.reap(&queue).await {
                            error!(queue, error = %e, "reaper tick failed");
                        }
                    }
                }
                Err(e) => error!(error = %e, "reaper could not list queues"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration as StdDuration;
    use zaku_protocol::Value;

    // Claim deadlines are wall-clock (`SystemTime`) based, since they must
    // survive being written to and read back from a backing store that
    // knows nothing about tokio's virtual clock — so this test waits on
    // real time rather than using `start_paused`.
    #[tokio::test]
    async fn a_claimed_task_is_back_in_pending_after_ttl_plus_reap_period() {
        let engine = Arc::new(QueueEngine::new(Arc::new(MemoryStore::new()), "zaku"));
        let task_id = engine.add("q1", &Value::Null, None).await.unwrap();
        engine.take("q1", 0.05).await.unwrap();

        let _handle = spawn(engine.clone(), StdDuration::from_millis(20));
        tokio::time::sleep(StdDuration::from_millis(200)).await;

        let (id, _) = engine.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(id, task_id);
    }
}
