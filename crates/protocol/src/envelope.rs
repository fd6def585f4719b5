//! The request/response envelope carried over the transport.

use crate::value::{CodecError, Value};
use std::fmt;

/// One of the recognized envelope operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Auth,
    InitQueue,
    RemoveQueue,
    ClearQueue,
    Add,
    Take,
    MarkDone,
    MarkReset,
    Publish,
    Subscribe,
    Unsubscribe,
    Ping,
    /// Server-initiated: a pub/sub delivery tagged with the subscription's `rid`.
    Event,
    /// Server-initiated: success response to a client request.
    Ack,
    /// Server-initiated: failure response to a client request.
    Err,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Auth => "AUTH",
            Op::InitQueue => "INIT_QUEUE",
            Op::RemoveQueue => "REMOVE_QUEUE",
            Op::ClearQueue => "CLEAR_QUEUE",
            Op::Add => "ADD",
            Op::Take => "TAKE",
            Op::MarkDone => "MARK_DONE",
            Op::MarkReset => "MARK_RESET",
            Op::Publish => "PUBLISH",
            Op::Subscribe => "SUBSCRIBE",
            Op::Unsubscribe => "UNSUBSCRIBE",
            Op::Ping => "PING",
            Op::Event => "EVENT",
            Op::Ack => "ACK",
            Op::Err => "ERR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "AUTH" => Op::Auth,
            "INIT_QUEUE" => Op::InitQueue,
            "REMOVE_QUEUE" => Op::RemoveQueue,
            "CLEAR_QUEUE" => Op::ClearQueue,
            "ADD" => Op::Add,
            "TAKE" => Op::Take,
            "MARK_DONE" => Op::MarkDone,
            "MARK_RESET" => Op::MarkReset,
            "PUBLISH" => Op::Publish,
            "SUBSCRIBE" => Op::Subscribe,
            "UNSUBSCRIBE" => Op::Unsubscribe,
            "PING" => Op::Ping,
            "EVENT" => Op::Event,
            "ACK" => Op::Ack,
            "ERR" => Op::Err,
            _ => return None,
        })
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried on `ERR` envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// The outer frame carrying op, correlation id, and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub op: Op,
    pub rid: Option<String>,
    pub queue: Option<String>,
    pub task_id: Option<String>,
    pub topic: Option<String>,
    pub ttl: Option<f64>,
    pub payload: Option<Value>,
    pub error: Option<ErrorInfo>,
    pub user: Option<String>,
    pub key: Option<String>,
}

impl Envelope {
    pub fn new(op: Op) -> Self {
        Envelope {
            op,
            rid: None,
            queue: None,
            task_id: None,
            topic: None,
            ttl: None,
            payload: None,
            error: None,
            user: None,
            key: None,
        }
    }

    pub fn with_rid(mut self, rid: impl Into<String>) -> Self {
        self.rid = Some(rid.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_ttl(mut self, ttl: f64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn ack(rid: impl Into<String>, payload: Option<Value>) -> Self {
        let mut e = Envelope::new(Op::Ack).with_rid(rid);
        e.payload = payload;
        e
    }

    pub fn err(
        rid: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut e = Envelope::new(Op::Err).with_rid(rid);
        e.error = Some(ErrorInfo {
            code: code.into(),
            message: message.into(),
        });
        e
    }

    /// Convert to the wire `Value` representation (a tagged map).
    pub fn to_value(&self) -> Value {
        let mut fields: Vec<(String, Value)> =
            vec![("op".to_owned(), Value::Str(self.op.as_str().to_owned()))];
        if let Some(rid) = &self.rid {
            fields.push(("rid".to_owned(), Value::Str(rid.clone())));
        }
        if let Some(q) = &self.queue {
            fields.push(("queue".to_owned(), Value::Str(q.clone())));
        }
        if let Some(t) = &self.task_id {
            fields.push(("task_id".to_owned(), Value::Str(t.clone())));
        }
        if let Some(t) = &self.topic {
            fields.push(("topic".to_owned(), Value::Str(t.clone())));
        }
        if let Some(ttl) = self.ttl {
            fields.push(("ttl".to_owned(), Value::Float(ttl)));
        }
        if let Some(p) = &self.payload {
            fields.push(("payload".to_owned(), p.clone()));
        }
        if let Some(e) = &self.error {
            fields.push((
                "error".to_owned(),
                Value::Map(vec![
                    ("code".to_owned(), Value::Str(e.code.clone())),
                    ("message".to_owned(), Value::Str(e.message.clone())),
                ]),
            ));
        }
        if let Some(u) = &self.user {
            fields.push(("user".to_owned(), Value::Str(u.clone())));
        }
        if let Some(k) = &self.key {
            fields.push(("key".to_owned(), Value::Str(k.clone())));
        }
        Value::Map(fields)
    }

    /// Parse the wire `Value` representation back into an envelope.
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let Value::Map(fields) = value else {
            return Err(CodecError::InvalidTag(0));
        };
        let mut op = None;
        let mut rid = None;
        let mut queue = None;
        let mut task_id = None;
        let mut topic = None;
        let mut ttl = None;
        let mut payload = None;
        let mut error = None;
        let mut user = None;
        let mut key = None;
        for (k, v) in fields {
            match (k.as_str(), v) {
                ("op", Value::Str(s)) => op = Op::parse(&s),
                ("rid", Value::Str(s)) => rid = Some(s),
                ("queue", Value::Str(s)) => queue = Some(s),
                ("task_id", Value::Str(s)) => task_id = Some(s),
                ("topic", Value::Str(s)) => topic = Some(s),
                ("ttl", Value::Float(f)) => ttl = Some(f),
                ("payload", v) => payload = Some(v),
                ("error", Value::Map(entries)) => {
                    let mut code = String::new();
                    let mut message = String::new();
                    for (ek, ev) in entries {
                        match (ek.as_str(), ev) {
                            ("code", Value::Str(s)) => code = s,
                            ("message", Value::Str(s)) => message = s,
                            _ => {}
                        }
                    }
                    error = Some(ErrorInfo { code, message });
                }
                ("user", Value::Str(s)) => user = Some(s),
                ("key", Value::Str(s)) => key = Some(s),
                _ => {}
            }
        }
        let op = op.ok_or(CodecError::InvalidTag(0))?;
        Ok(Envelope {
            op,
            rid,
            queue,
            task_id,
            topic,
            ttl,
            payload,
            error,
            user,
            key,
        })
    }
}
