//! RPC-over-queue: a task delivers work, a topic delivers the result(s).
//! Correlation is purely by payload convention — the fabric never couples
//! task and topic at the server.

use crate::client::Client;
use crate::error::ClientError;
use crate::events::EventStream;
use uuid::Uuid;
use zaku_protocol::Value;

const REQUEST_ID_FIELD: &str = "_request_id";

fn with_request_id(payload: Value, request_id: &str) -> Value {
    let mut fields = match payload {
        Value::Map(fields) => fields,
        other => vec![("value".to_owned(), other)],
    };
    fields.push((
        REQUEST_ID_FIELD.to_owned(),
        Value::Str(request_id.to_owned()),
    ));
    Value::Map(fields)
}

/// Reads the `_request_id` field a worker needs to publish its result to.
pub fn request_id_of(payload: &Value) -> Option<&str> {
    let Value::Map(fields) = payload else {
        return None;
    };
    fields.iter().find_map(|(k, v)| match (k.as_str(), v) {
        (REQUEST_ID_FIELD, Value::Str(s)) => Some(s.as_str()),
        _ => None,
    })
}

impl Client {
    /// Single-result RPC: subscribes to a fresh topic, adds the task, waits
    /// for one event, unsubscribes.
    pub async fn rpc_call(
        &self,
        queue: &str,
        payload: Value,
        timeout_seconds: f64,
    ) -> Result<Option<Value>, ClientError> {
        let request_id = Uuid::new_v4().to_string();
        let mut stream = self
            .subscribe_stream(&request_id, Some(timeout_seconds))
            .await?;
        self.add(queue, with_request_id(payload, &request_id), None)
            .await?;
        let result = stream.next().await;
        stream.unsubscribe().await?;
        Ok(result)
    }

    /// Streaming RPC: same setup, but returns the open stream so the caller
    /// can consume multiple published results.
    pub async fn rpc_call_stream(
        &self,
        queue: &str,
        payload: Value,
        idle_timeout_seconds: f64,
    ) -> Result<EventStream, ClientError> {
        let request_id = Uuid::new_v4().to_string();
        let stream = self
            .subscribe_stream(&request_id, Some(idle_timeout_seconds))
            .await?;
        self.add(queue, with_request_id(payload, &request_id), None)
            .await?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaku_server::test_support::TestServer;

    #[tokio::test]
    async fn rpc_round_trip() {
        let server = TestServer::start().await;
        let client = Client::connect(server.addr).await.unwrap();
        let worker = Client::connect(server.addr).await.unwrap();
        client.init_queue("q_rpc").await.unwrap();

        let worker_task = tokio::spawn(async move {
            let payload = loop {
                if let Some((_, payload)) = worker.take("q_rpc", 30.0).await.unwrap() {
                    break payload;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            };
            let request_id = request_id_of(&payload).unwrap().to_owned();
            let Value::Map(fields) = &payload else {
                panic!()
            };
            let x = fields
                .iter()
                .find(|(k, _)| k == "x")
                .map(|(_, v)| v.clone())
                .unwrap();
            worker
                .publish(
                    &request_id,
                    Value::Map(vec![
                        ("result".to_owned(), Value::Str("ok".to_owned())),
                        ("x".to_owned(), x),
                    ]),
                )
                .await
                .unwrap();
        });

        let result = client
            .rpc_call(
                "q_rpc",
                Value::Map(vec![("x".to_owned(), Value::Int(7))]),
                5.0,
            )
            .await
            .unwrap()
            .expect("rpc result");
        worker_task.await.unwrap();

        assert_eq!(
            result,
            Value::Map(vec![
                ("result".to_owned(), Value::Str("ok".to_owned())),
                ("x".to_owned(), Value::Int(7)),
            ])
        );
        server.shutdown().await;
    }
}
