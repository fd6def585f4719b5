//! In-process harness for integration tests: bind a server to a random
//! local port, connect a raw client over the real codec, and drive
//! request/response pairs without going through the `zaku-client` crate.

use crate::auth::AuthConfig;
use crate::queue::QueueEngine;
use crate::state::ServerState;
use crate::store::MemoryStore;
use crate::transport;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use zaku_protocol::{Envelope, EnvelopeCodec};

pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub state: ServerState,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    accept_handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let queues = Arc::new(QueueEngine::new(Arc::new(MemoryStore::new()), "zaku-test"));
        let state = ServerState::new(queues, AuthConfig::disabled());
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let accept_handle = tokio::spawn(transport::serve(listener, state.clone(), shutdown_rx));
        TestServer {
            addr,
            state,
            shutdown_tx,
            accept_handle,
        }
    }

    pub async fn connect(&self) -> MockClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        MockClient {
            framed: Framed::new(stream, EnvelopeCodec::default()),
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.accept_handle.await;
    }
}

pub struct MockClient {
    framed: Framed<TcpStream, EnvelopeCodec>,
}

impl MockClient {
    pub async fn send(&mut self, envelope: Envelope) {
        self.framed.send(envelope).await.expect("send envelope");
    }

    pub async fn recv(&mut self) -> Envelope {
        self.framed
            .next()
            .await
            .expect("stream ended")
            .expect("decode envelope")
    }

    /// Send a request and wait for the response carrying the same `rid`.
    pub async fn request(&mut self, envelope: Envelope) -> Envelope {
        let rid = envelope.rid.clone();
        self.send(envelope).await;
        loop {
            let response = self.recv().await;
            if response.rid == rid {
                return response;
            }
        }
    }
}
