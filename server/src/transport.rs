//! Accepts persistent bidirectional client connections, frames request and
//! response envelopes, dispatches requests to handlers, and routes
//! asynchronous broadcasts back to subscribed connections.

use crate::error::ZakuError;
use crate::state::ServerState;
use futures::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tokio_util::codec::Framed;
use tracing::{info, warn};
use zaku_protocol::{Envelope, EnvelopeCodec, Op, Value};

/// Accepts connections on `listener` until `shutdown` resolves, spawning one
/// task per connection.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((socket, peer)) = accepted else { continue };
                let state = state.clone();
                tokio::spawn(async move {
                    info!(%peer, "connection accepted");
                    handle_connection(socket, state).await;
                    info!(%peer, "connection closed");
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("transport accept loop shutting down");
                    return;
                }
            }
        }
    }
}

struct Subscription {
    abort: AbortHandle,
}

async fn handle_connection(socket: TcpStream, state: ServerState) {
    let framed = Framed::new(socket, EnvelopeCodec::default());
    let (mut sink, mut stream) = framed.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(256);

    let mut authenticated = !state.auth.is_enabled();
    let mut subscriptions: HashMap<String, Subscription> = HashMap::new();
    let mut claimed: HashSet<(String, String)> = HashSet::new();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else { break };
                let envelope = match frame {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "framing error, closing connection");
                        break;
                    }
                };
                if !authenticated {
                    if envelope.op != Op::Auth {
                        let rid = envelope.rid.clone().unwrap_or_default();
                        let _ = sink.send(Envelope::err(rid, zaku_protocol::error_codes::UNAUTHENTICATED, "AUTH required")).await;
                        break;
                    }
                    authenticated = state.auth.check(envelope.user.as_deref(), envelope.key.as_deref());
                    let rid = envelope.rid.clone().unwrap_or_default();
                    if authenticated {
                        let _ = sink.send(Envelope::ack(rid, None)).await;
                        continue;
                    }
                    let _ = sink.send(Envelope::err(rid, zaku_protocol::error_codes::UNAUTHENTICATED, "invalid credentials")).await;
                    break;
                }

                if envelope.op == Op::Auth {
                    // Already authenticated; a second AUTH is accepted as a no-op ack.
                    let rid = envelope.rid.clone().unwrap_or_default();
                    let _ = sink.send(Envelope::ack(rid, None)).await;
                    continue;
                }

                if let Some(response) = dispatch(&state, envelope, &outbound_tx, &mut subscriptions, &mut claimed).await
                    && sink.send(response).await.is_err()
                {
                    break;
                }
            }
            Some(envelope) = outbound_rx.recv() => {
                if sink.send(envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    for sub in subscriptions.into_values() {
        sub.abort.abort();
    }
    for (queue, task_id) in claimed {
        if let Err(e) = state.queues.mark_reset(&queue, &task_id).await {
            warn!(queue, task_id, error = %e, "best-effort reset on disconnect failed");
        }
    }
}

/// Handles one request envelope. `Op::Ping`/`Op::Subscribe` may not produce
/// an immediate `ACK`/`ERR` of their own beyond the initial ack, depending
/// on the op.
async fn dispatch(
    state: &ServerState,
    envelope: Envelope,
    outbound_tx: &mpsc::Sender<Envelope>,
    subscriptions: &mut HashMap<String, Subscription>,
    claimed: &mut HashSet<(String, String)>,
) -> Option<Envelope> {
    let rid = envelope.rid.clone().unwrap_or_default();
    let result = handle_op(state, envelope, outbound_tx, subscriptions, claimed).await;
    match result {
        Ok(response) => response,
        Err(e) => Some(Envelope::err(rid, e.code(), e.to_string())),
    }
}

async fn handle_op(
    state: &ServerState,
    envelope: Envelope,
    outbound_tx: &mpsc::Sender<Envelope>,
    subscriptions: &mut HashMap<String, Subscription>,
    claimed: &mut HashSet<(String, String)>,
) -> Result<Option<Envelope>, ZakuError> {
    let rid = envelope.rid.clone().unwrap_or_default();
    match envelope.op {
        Op::Ping => Ok(Some(Envelope::ack(rid, None))),

        Op::InitQueue => {
            let queue = require_queue(&envelope)?;
            state.queues.init_queue(&queue).await?;
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::RemoveQueue => {
            let queue = require_queue(&envelope)?;
            state.queues.remove_queue(&queue).await?;
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::ClearQueue => {
            let queue = require_queue(&envelope)?;
            state.queues.clear_queue(&queue).await?;
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::Add => {
            let queue = require_queue(&envelope)?;
            let payload = envelope.payload.clone().unwrap_or(Value::Null);
            let id = state
                .queues
                .add(&queue, &payload, envelope.task_id.clone())
                .await?;
            Ok(Some(Envelope::ack(rid, Some(Value::Str(id)))))
        }

        Op::Take => {
            let queue = require_queue(&envelope)?;
            let ttl = envelope.ttl.unwrap_or(30.0);
            match state.queues.take(&queue, ttl).await? {
                None => Ok(Some(Envelope::ack(rid, None))),
                Some((task_id, payload)) => {
                    claimed.insert((queue.clone(), task_id.clone()));
                    let response = Envelope::ack(rid, Some(payload)).with_task_id(task_id);
                    Ok(Some(response))
                }
            }
        }

        Op::MarkDone => {
            let queue = require_queue(&envelope)?;
            let task_id = require_task_id(&envelope)?;
            state.queues.mark_done(&queue, &task_id).await?;
            claimed.remove(&(queue, task_id));
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::MarkReset => {
            let queue = require_queue(&envelope)?;
            let task_id = require_task_id(&envelope)?;
            state.queues.mark_reset(&queue, &task_id).await?;
            claimed.remove(&(queue, task_id));
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::Publish => {
            let topic = require_topic(&envelope)?;
            let payload = envelope.payload.clone().unwrap_or(Value::Null);
            let count = state.pubsub.publish(&topic, payload).await;
            Ok(Some(Envelope::ack(rid, Some(Value::Int(count as i64)))))
        }

        Op::Subscribe => {
            let topic = require_topic(&envelope)?;
            if subscriptions.contains_key(&rid) {
                return Err(ZakuError::InvalidArgument(format!(
                    "subscription already active for rid {rid}"
                )));
            }
            let mut receiver = state.pubsub.subscribe(&topic).await;
            let idle_timeout = envelope
                .ttl
                .filter(|t| *t > 0.0)
                .map(Duration::from_secs_f64);
            let out = outbound_tx.clone();
            let sub_rid = rid.clone();
            let handle = tokio::spawn(async move {
                loop {
                    let next = match idle_timeout {
                        Some(timeout) => tokio::time::timeout(timeout, receiver.recv()).await,
                        None => Ok(receiver.recv().await),
                    };
                    match next {
                        Ok(Ok(value)) => {
                            let event = Envelope::new(Op::Event)
                                .with_rid(sub_rid.clone())
                                .with_payload(value);
                            if out.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                            warn!(
                                rid = sub_rid,
                                skipped, "subscriber fell behind, dropping missed events"
                            );
                            continue;
                        }
                        Ok(Err(broadcast::error::RecvError::Closed)) => return,
                        Err(_) => {
                            let terminal = Envelope::new(Op::Event).with_rid(sub_rid.clone());
                            let _ = out.send(terminal).await;
                            return;
                        }
                    }
                }
            });
            subscriptions.insert(
                rid.clone(),
                Subscription {
                    abort: handle.abort_handle(),
                },
            );
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::Unsubscribe => {
            let sub_rid = envelope.rid.clone().unwrap_or_default();
            if let Some(sub) = subscriptions.remove(&sub_rid) {
                sub.abort.abort();
            }
            Ok(Some(Envelope::ack(rid, None)))
        }

        Op::Auth | Op::Event | Op::Ack | Op::Err => Err(ZakuError::InvalidArgument(format!(
            "unexpected client-sent op {}",
            envelope.op
        ))),
    }
}

fn require_queue(envelope: &Envelope) -> Result<String, ZakuError> {
    envelope
        .queue
        .clone()
        .ok_or_else(|| ZakuError::InvalidArgument("missing queue".into()))
}

fn require_task_id(envelope: &Envelope) -> Result<String, ZakuError> {
    envelope
        .task_id
        .clone()
        .ok_or_else(|| ZakuError::InvalidArgument("missing task_id".into()))
}

fn require_topic(envelope: &Envelope) -> Result<String, ZakuError> {
    envelope
        .topic
        .clone()
        .ok_or_else(|| ZakuError::InvalidArgument("missing topic".into()))
}
