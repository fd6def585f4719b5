//! One-shot and streaming consumption on top of `SUBSCRIBE`.

use crate::client::Client;
use crate::error::ClientError;
use tokio::sync::mpsc;
use zaku_protocol::{Envelope, Op, Value};

/// A live subscription. Each `next()` call yields one published payload;
/// `None` once the subscription's idle timeout elapses or the connection
/// closes.
pub struct EventStream {
    client: Client,
    topic: String,
    rid: String,
    rx: mpsc::Receiver<Envelope>,
    done: bool,
}

impl EventStream {
    pub(crate) fn new(
        client: Client,
        topic: String,
        rid: String,
        rx: mpsc::Receiver<Envelope>,
    ) -> Self {
        EventStream {
            client,
            topic,
            rid,
            rx,
            done: false,
        }
    }

    pub async fn next(&mut self) -> Option<Value> {
        if self.done {
            return None;
        }
        loop {
            let envelope = self.rx.recv().await?;
            if envelope.op != Op::Event {
                continue;
            }
            match envelope.payload {
                Some(value) => return Some(value),
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    pub async fn unsubscribe(mut self) -> Result<(), ClientError> {
        self.done = true;
        self.client.unsubscribe(&self.topic, &self.rid).await
    }
}

impl Client {
    /// Opens a subscription; the timeout is a per-event idle deadline reset
    /// on each delivery.
    pub async fn subscribe_stream(
        &self,
        topic: &str,
        idle_timeout_seconds: Option<f64>,
    ) -> Result<EventStream, ClientError> {
        let (rid, rx) = self.open_subscription(topic, idle_timeout_seconds).await?;
        Ok(EventStream::new(self.clone(), topic.to_owned(), rid, rx))
    }

    /// Subscribes, waits for the first matching event, then unsubscribes.
    pub async fn subscribe_one(
        &self,
        topic: &str,
        timeout_seconds: f64,
    ) -> Result<Option<Value>, ClientError> {
        let mut stream = self.subscribe_stream(topic, Some(timeout_seconds)).await?;
        let value = stream.next().await;
        stream.unsubscribe().await?;
        Ok(value)
    }
}
