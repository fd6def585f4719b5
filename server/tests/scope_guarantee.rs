//! A claimed task that is never marked done or reset must come back to
//! pending when its owning connection disconnects.

use zaku_protocol::{Envelope, Op, Value};
use zaku_server::test_support::TestServer;

#[tokio::test]
async fn disconnecting_without_resolving_a_claim_returns_it_to_pending() {
    let server = TestServer::start().await;
    {
        let mut client = server.connect().await;
        client
            .request(Envelope::new(Op::InitQueue).with_rid("r0").with_queue("q"))
            .await;
        client
            .request(
                Envelope::new(Op::Add)
                    .with_rid("r1")
                    .with_queue("q")
                    .with_payload(Value::Null),
            )
            .await;
        client
            .request(
                Envelope::new(Op::Take)
                    .with_rid("r2")
                    .with_queue("q")
                    .with_ttl(30.0),
            )
            .await;
        // client dropped here without MARK_DONE/MARK_RESET
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut other = server.connect().await;
    let retaken = other
        .request(
            Envelope::new(Op::Take)
                .with_rid("r3")
                .with_queue("q")
                .with_ttl(30.0),
        )
        .await;
    assert!(retaken.task_id.is_some());
    server.shutdown().await;
}
