use zaku_protocol::{ErrorInfo, error_codes};

/// Server-side error kinds, each mapped to one of the frozen error codes
/// carried on `ERR` envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ZakuError {
    #[error("task id already exists in queue: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ZakuError {
    pub fn code(&self) -> &'static str {
        match self {
            ZakuError::Conflict(_) => error_codes::CONFLICT,
            ZakuError::NotFound(_) => error_codes::NOT_FOUND,
            ZakuError::InvalidArgument(_) => error_codes::INVALID_ARGUMENT,
            ZakuError::Unauthenticated => error_codes::UNAUTHENTICATED,
            ZakuError::BackingStoreUnavailable(_) => error_codes::BACKING_STORE_UNAVAILABLE,
            ZakuError::Internal(_) => error_codes::INTERNAL,
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }
}
