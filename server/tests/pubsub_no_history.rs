//! A subscriber only ever sees events published after it subscribes; the
//! fabric keeps no replay buffer.

use zaku_protocol::{Envelope, Op, Value};
use zaku_server::test_support::TestServer;

#[tokio::test]
async fn publish_before_subscribe_is_never_delivered() {
    let server = TestServer::start().await;
    let mut publisher = server.connect().await;
    publisher
        .request(
            Envelope::new(Op::Publish)
                .with_rid("r0")
                .with_topic("t")
                .with_payload(Value::Str("stale".to_owned())),
        )
        .await;

    let mut subscriber = server.connect().await;
    subscriber
        .request(
            Envelope::new(Op::Subscribe)
                .with_rid("sub1")
                .with_topic("t")
                .with_ttl(0.15),
        )
        .await;

    publisher
        .request(
            Envelope::new(Op::Publish)
                .with_rid("r1")
                .with_topic("t")
                .with_payload(Value::Str("fresh".to_owned())),
        )
        .await;

    let event = subscriber.recv().await;
    assert_eq!(event.op, Op::Event);
    assert_eq!(event.payload, Some(Value::Str("fresh".to_owned())));

    let terminal = subscriber.recv().await;
    assert_eq!(terminal.op, Op::Event);
    assert_eq!(terminal.payload, None);
    server.shutdown().await;
}

#[tokio::test]
async fn publish_with_no_subscribers_reports_zero_deliveries() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    let response = client
        .request(
            Envelope::new(Op::Publish)
                .with_rid("r0")
                .with_topic("nobody-listening")
                .with_payload(Value::Null),
        )
        .await;
    assert_eq!(response.payload, Some(Value::Int(0)));
    server.shutdown().await;
}
