//! Identity-layer error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DidError {
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("DID not found: {0}")]
    NotFound(String),

    #[error("DID revoked: {0}")]
    Revoked(String),

    #[error("DID already registered: {0}")]
    Conflict(String),

    #[error("document validation failed: {0}")]
    Validation(String),

    #[error("proof verification failed: {0}")]
    Proof(String),

    #[error("chain call timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("chain error: {0}")]
    Chain(#[from] crate::chain::ChainError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Pqc(#[from] qlink_pqc::PqcError),
}

impl DidError {
    /// Stable machine code, aligned with the wire status codes
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDid(_) | Self::Validation(_) | Self::Json(_) | Self::Pqc(_) => {
                "ERROR_INVALID"
            }
            Self::NotFound(_) => "ERROR_UNKNOWN_IDENTITY",
            Self::Revoked(_) => "ERROR_REVOKED",
            Self::Conflict(_) => "ERROR_CONFLICT",
            Self::Proof(_) => "ERROR_VERIFICATION_FAILED",
            Self::Timeout | Self::Canceled => "ERROR_TIMEOUT",
            Self::Storage(_) | Self::Chain(_) => "ERROR_INVALID",
        }
    }
}

pub type Result<T> = std::result::Result<T, DidError>;
