//! The explicit, process-wide server context: the subscriber registry and
//! the queue engine are constructed once at startup and passed down rather
//! than reached for as module-level singletons.

use crate::auth::AuthConfig;
use crate::pubsub::PubSub;
use crate::queue::QueueEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct ServerState {
    pub queues: Arc<QueueEngine>,
    pub pubsub: PubSub,
    pub auth: AuthConfig,
}

impl ServerState {
    pub fn new(queues: Arc<QueueEngine>, auth: AuthConfig) -> Self {
        ServerState {
            queues,
            pubsub: PubSub::new(),
            auth,
        }
    }
}
