//! Synchronous-feeling async facade over one persistent connection: request
//! methods await their matching response regardless of what else is in
//! flight on the same socket, demultiplexed by `rid`.

use crate::error::ClientError;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::codec::Framed;
use zaku_protocol::{Envelope, EnvelopeCodec, Op, Value};

enum Waiter {
    Once(oneshot::Sender<Envelope>),
    Stream(mpsc::Sender<Envelope>),
}

struct Inner {
    write: Mutex<futures::stream::SplitSink<Framed<TcpStream, EnvelopeCodec>, Envelope>>,
    waiters: Arc<Mutex<HashMap<String, Waiter>>>,
    next_rid: AtomicU64,
}

/// A connection to a Zaku server. Cheap to clone — clones share the same
/// underlying socket and background reader.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, ClientError> {
        let framed = Framed::new(stream, EnvelopeCodec::default());
        let (write, mut read) = framed.split();
        let waiters: Arc<Mutex<HashMap<String, Waiter>>> = Arc::new(Mutex::new(HashMap::new()));
        let reader_waiters = waiters.clone();

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let Ok(envelope) = frame else { break };
                let Some(rid) = envelope.rid.clone() else {
                    continue;
                };
                let mut waiters = reader_waiters.lock().await;
                match waiters.get(&rid) {
                    Some(Waiter::Once(_)) => {
                        if let Some(Waiter::Once(tx)) = waiters.remove(&rid) {
                            let _ = tx.send(envelope);
                        }
                    }
                    Some(Waiter::Stream(tx)) => {
                        let is_terminal = envelope.op == Op::Event && envelope.payload.is_none();
                        let tx = tx.clone();
                        if is_terminal {
                            waiters.remove(&rid);
                        }
                        drop(waiters);
                        let _ = tx.send(envelope).await;
                        continue;
                    }
                    None => {}
                }
            }
        });

        Ok(Client {
            inner: Arc::new(Inner {
                write: Mutex::new(write),
                waiters,
                next_rid: AtomicU64::new(0),
            }),
        })
    }

    pub fn fresh_rid(&self) -> String {
        let n = self.inner.next_rid.fetch_add(1, Ordering::Relaxed);
        format!("c{n}")
    }

    async fn call(&self, envelope: Envelope) -> Result<Envelope, ClientError> {
        let rid = envelope
            .rid
            .clone()
            .expect("request envelope must carry an rid");
        let (tx, rx) = oneshot::channel();
        self.inner
            .waiters
            .lock()
            .await
            .insert(rid, Waiter::Once(tx));
        self.inner
            .write
            .lock()
            .await
            .send(envelope)
            .await
            .map_err(ClientError::Framing)?;
        let response = rx.await.map_err(|_| ClientError::ConnectionClosed)?;
        if response.op == Op::Err {
            let err = response.error.expect("ERR envelope carries error info");
            return Err(ClientError::Server {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response)
    }

    pub async fn auth(
        &self,
        user: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<(), ClientError> {
        let mut envelope = Envelope::new(Op::Auth).with_rid(self.fresh_rid());
        envelope.user = Some(user.into());
        envelope.key = Some(key.into());
        self.call(envelope).await.map(|_| ())
    }

    pub async fn init_queue(&self, queue: &str) -> Result<(), ClientError> {
        let envelope = Envelope::new(Op::InitQueue)
            .with_rid(self.fresh_rid())
            .with_queue(queue);
        self.call(envelope).await.map(|_| ())
    }

    pub async fn remove_queue(&self, queue: &str) -> Result<(), ClientError> {
        let envelope = Envelope::new(Op::RemoveQueue)
            .with_rid(self.fresh_rid())
            .with_queue(queue);
        self.call(envelope).await.map(|_| ())
    }

    pub async fn clear_queue(&self, queue: &str) -> Result<(), ClientError> {
        let envelope = Envelope::new(Op::ClearQueue)
            .with_rid(self.fresh_rid())
            .with_queue(queue);
        self.call(envelope).await.map(|_| ())
    }

    pub async fn add(
        &self,
        queue: &str,
        payload: Value,
        task_id: Option<String>,
    ) -> Result<String, ClientError> {
        let mut envelope = Envelope::new(Op::Add)
            .with_rid(self.fresh_rid())
            .with_queue(queue)
            .with_payload(payload);
        if let Some(id) = task_id {
            envelope = envelope.with_task_id(id);
        }
        let response = self.call(envelope).await?;
        match response.payload {
            Some(Value::Str(id)) => Ok(id),
            _ => Err(ClientError::Server {
                code: "INTERNAL".to_owned(),
                message: "ADD response missing id".to_owned(),
            }),
        }
    }

    /// Pops the oldest pending task, or `None` if the queue is empty.
    pub async fn take(
        &self,
        queue: &str,
        ttl_seconds: f64,
    ) -> Result<Option<(String, Value)>, ClientError> {
        let envelope = Envelope::new(Op::Take)
            .with_rid(self.fresh_rid())
            .with_queue(queue)
            .with_ttl(ttl_seconds);
        let response = self.call(envelope).await?;
        match (response.task_id, response.payload) {
            (Some(id), payload) => Ok(Some((id, payload.unwrap_or(Value::Null)))),
            (None, _) => Ok(None),
        }
    }

    /// Like [`Client::take`], but wraps a claimed task in a [`crate::ScopedClaim`]
    /// that releases it (done or reset) on every exit path.
    pub async fn take_scoped(
        &self,
        queue: &str,
        ttl_seconds: f64,
    ) -> Result<Option<crate::ScopedClaim>, ClientError> {
        Ok(self
            .take(queue, ttl_seconds)
            .await?
            .map(|(task_id, payload)| {
                crate::ScopedClaim::new(self.clone(), queue.to_owned(), task_id, payload)
            }))
    }

    pub async fn mark_done(&self, queue: &str, task_id: &str) -> Result<(), ClientError> {
        let envelope = Envelope::new(Op::MarkDone)
            .with_rid(self.fresh_rid())
            .with_queue(queue)
            .with_task_id(task_id);
        self.call(envelope).await.map(|_| ())
    }

    pub async fn mark_reset(&self, queue: &str, task_id: &str) -> Result<(), ClientError> {
        let envelope = Envelope::new(Op::MarkReset)
            .with_rid(self.fresh_rid())
            .with_queue(queue)
            .with_task_id(task_id);
        self.call(envelope).await.map(|_| ())
    }

    /// Returns the number of subscribers the fabric attempted delivery to.
    pub async fn publish(&self, topic: &str, payload: Value) -> Result<i64, ClientError> {
        let envelope = Envelope::new(Op::Publish)
            .with_rid(self.fresh_rid())
            .with_topic(topic)
            .with_payload(payload);
        let response = self.call(envelope).await?;
        match response.payload {
            Some(Value::Int(n)) => Ok(n),
            _ => Ok(0),
        }
    }

    pub(crate) async fn open_subscription(
        &self,
        topic: &str,
        timeout_seconds: Option<f64>,
    ) -> Result<(String, mpsc::Receiver<Envelope>), ClientError> {
        let rid = self.fresh_rid();
        let (tx, rx) = mpsc::channel(64);
        self.inner
            .waiters
            .lock()
            .await
            .insert(rid.clone(), Waiter::Stream(tx));

        let mut envelope = Envelope::new(Op::Subscribe)
            .with_rid(rid.clone())
            .with_topic(topic);
        if let Some(t) = timeout_seconds {
            envelope = envelope.with_ttl(t);
        }
        self.inner
            .write
            .lock()
            .await
            .send(envelope)
            .await
            .map_err(ClientError::Framing)?;
        Ok((rid, rx))
    }

    pub async fn unsubscribe(&self, topic: &str, rid: &str) -> Result<(), ClientError> {
        self.inner.waiters.lock().await.remove(rid);
        let envelope = Envelope::new(Op::Unsubscribe)
            .with_rid(rid.to_owned())
            .with_topic(topic);
        self.inner
            .write
            .lock()
            .await
            .send(envelope)
            .await
            .map_err(ClientError::Framing)
    }
}
