//! Synchronous-feeling client facade for Zaku: connection, scoped claim
//! acquisition, and RPC-over-queue helpers.

mod client;
mod error;
mod events;
mod rpc;
mod scope;

pub use client::Client;
pub use error::ClientError;
pub use events::EventStream;
pub use rpc::request_id_of;
pub use scope::ScopedClaim;
