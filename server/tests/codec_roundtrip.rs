//! End-to-end: a payload survives ADD -> TAKE through the real TCP framing
//! and the backing-store's base64-encoded storage, untouched.

use zaku_protocol::{Envelope, Op, Value};
use zaku_server::test_support::TestServer;

#[tokio::test]
async fn nested_payload_round_trips_through_storage_and_the_wire() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client
        .request(Envelope::new(Op::InitQueue).with_rid("r0").with_queue("q"))
        .await;

    let payload = Value::Map(vec![
        ("name".to_owned(), Value::Str("batch-17".to_owned())),
        (
            "scores".to_owned(),
            Value::List(vec![Value::Float(0.5), Value::Float(1.25)]),
        ),
        (
            "tags".to_owned(),
            Value::List(vec![Value::Str("a".to_owned()), Value::Str("b".to_owned())]),
        ),
        ("raw".to_owned(), Value::Bytes(vec![0, 1, 2, 255].into())),
        ("cancelled".to_owned(), Value::Bool(false)),
        ("retries".to_owned(), Value::Int(-3)),
    ]);

    client
        .request(
            Envelope::new(Op::Add)
                .with_rid("r1")
                .with_queue("q")
                .with_payload(payload.clone()),
        )
        .await;

    let taken = client
        .request(
            Envelope::new(Op::Take)
                .with_rid("r2")
                .with_queue("q")
                .with_ttl(30.0),
        )
        .await;
    assert_eq!(taken.payload, Some(payload));
    server.shutdown().await;
}
