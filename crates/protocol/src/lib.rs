//! Wire protocol for Zaku: the self-describing payload codec, the
//! request/response envelope, and the length-delimited framing that carries
//! both over a persistent bidirectional stream.

pub mod envelope;
pub mod framing;
pub mod value;

pub use envelope::{Envelope, ErrorInfo, Op};
pub use framing::{EnvelopeCodec, FramingError};
pub use value::{CodecError, DType, Value, decode, encode};

/// Frozen error codes surfaced to clients.
pub mod error_codes {
    pub const CONFLICT: &str = "CONFLICT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const BACKING_STORE_UNAVAILABLE: &str = "BACKING_STORE_UNAVAILABLE";
    pub const INTERNAL: &str = "INTERNAL";
}
