#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Framing(#[from] zaku_protocol::FramingError),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
