//! Zaku server: transport, queue engine, pub/sub fabric, backing-store
//! adapter, and reaper.

pub mod auth;
pub mod config;
pub mod error;
pub mod pubsub;
pub mod queue;
pub mod reaper;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;
