//! Many concurrent TAKEs against a fixed pending set must return each task
//! id to exactly one claimant.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use zaku_protocol::{Envelope, Op, Value};
use zaku_server::test_support::TestServer;

#[tokio::test]
async fn concurrent_takes_never_double_claim() {
    let server = Arc::new(TestServer::start().await);
    let mut seed = server.connect().await;
    seed.request(Envelope::new(Op::InitQueue).with_rid("r0").with_queue("q"))
        .await;

    const TASKS: usize = 40;
    for i in 0..TASKS {
        seed.request(
            Envelope::new(Op::Add)
                .with_rid(format!("add{i}"))
                .with_queue("q")
                .with_payload(Value::Int(i as i64)),
        )
        .await;
    }

    let claimed: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut handles = Vec::new();
    for _ in 0..(TASKS * 2) {
        let server = server.clone();
        let claimed = claimed.clone();
        handles.push(tokio::spawn(async move {
            let mut client = server.connect().await;
            let response = client
                .request(
                    Envelope::new(Op::Take)
                        .with_rid("t")
                        .with_queue("q")
                        .with_ttl(30.0),
                )
                .await;
            if let Some(task_id) = response.task_id {
                let mut seen = claimed.lock().await;
                assert!(seen.insert(task_id), "task claimed twice");
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(claimed.lock().await.len(), TASKS);
    Arc::try_unwrap(server).ok().unwrap().shutdown().await;
}
