//! Scoped claim acquisition: take a task, then call exactly one of
//! `MARK_DONE` (normal completion) or `MARK_RESET` (any other exit path,
//! including a dropped guard) on every exit.

use crate::client::Client;
use crate::error::ClientError;
use zaku_protocol::Value;

pub struct ScopedClaim {
    client: Client,
    queue: String,
    task_id: String,
    payload: Value,
    finished: bool,
}

impl ScopedClaim {
    pub(crate) fn new(client: Client, queue: String, task_id: String, payload: Value) -> Self {
        ScopedClaim {
            client,
            queue,
            task_id,
            payload,
            finished: false,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Normal exit: marks the task done and consumes the guard.
    pub async fn done(mut self) -> Result<(), ClientError> {
        self.finished = true;
        self.client.mark_done(&self.queue, &self.task_id).await
    }

    /// Explicit early exit: resets the task and consumes the guard.
    pub async fn reset(mut self) -> Result<(), ClientError> {
        self.finished = true;
        self.client.mark_reset(&self.queue, &self.task_id).await
    }
}

impl Drop for ScopedClaim {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Drop can't await; fire the reset in the background so a dropped
        // guard (panic, early return) still releases the claim.
        let client = self.client.clone();
        let queue = std::mem::take(&mut self.queue);
        let task_id = std::mem::take(&mut self.task_id);
        tokio::spawn(async move {
            let _ = client.mark_reset(&queue, &task_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use zaku_server::test_support::TestServer;

    #[tokio::test]
    async fn done_is_called_exactly_once_on_normal_completion() {
        let server = TestServer::start().await;
        let client = Client::connect(server.addr).await.unwrap();
        client.init_queue("q1").await.unwrap();
        let id = client.add("q1", Value::Int(1), None).await.unwrap();
        let (task_id, payload) = client.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(task_id, id);

        let guard = ScopedClaim::new(client.clone(), "q1".to_owned(), task_id, payload);
        guard.done().await.unwrap();

        assert!(client.take("q1", 30.0).await.unwrap().is_none());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_guard_without_done_resets_the_task() {
        let server = TestServer::start().await;
        let client = Client::connect(server.addr).await.unwrap();
        client.init_queue("q1").await.unwrap();
        let id = client.add("q1", Value::Int(1), None).await.unwrap();
        let (task_id, payload) = client.take("q1", 30.0).await.unwrap().unwrap();

        {
            let _guard = ScopedClaim::new(client.clone(), "q1".to_owned(), task_id, payload);
        }
        // Give the background reset task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (retaken, _) = client.take("q1", 30.0).await.unwrap().unwrap();
        assert_eq!(retaken, id);
        server.shutdown().await;
    }
}
