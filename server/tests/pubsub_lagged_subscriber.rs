//! A subscriber that falls behind the topic's fixed channel capacity only
//! loses the events it missed; the forwarding task keeps running and later
//! publishes still reach it (§4.4's documented at-most-once semantics,
//! scoped to the lagging event rather than the whole subscription).

use zaku_protocol::{Envelope, Op, Value};
use zaku_server::test_support::TestServer;

#[tokio::test]
async fn subscription_survives_a_lag_and_keeps_delivering() {
    let server = TestServer::start().await;
    let mut subscriber = server.connect().await;
    subscriber
        .request(
            Envelope::new(Op::Subscribe)
                .with_rid("sub1")
                .with_topic("t"),
        )
        .await;

    let mut publisher = server.connect().await;
    // Flood well past the topic's fixed broadcast capacity without the
    // subscriber ever reading, forcing it to lag.
    for i in 0..2000 {
        publisher
            .request(
                Envelope::new(Op::Publish)
                    .with_rid(format!("flood{i}"))
                    .with_topic("t")
                    .with_payload(Value::Int(i)),
            )
            .await;
    }

    publisher
        .request(
            Envelope::new(Op::Publish)
                .with_rid("after")
                .with_topic("t")
                .with_payload(Value::Str("still-alive".to_owned())),
        )
        .await;

    // The forwarding task must still be running: it may have dropped a run
    // of lagged events, but it keeps delivering after the lag instead of
    // exiting silently.
    let event = loop {
        let event = subscriber.recv().await;
        assert_eq!(event.op, Op::Event);
        if event.payload == Some(Value::Str("still-alive".to_owned())) {
            break event;
        }
    };
    assert_eq!(event.rid, Some("sub1".to_owned()));
    server.shutdown().await;
}
