//! Protocol error types
//!
//! Every variant carries a stable mapping onto the wire status codes; the
//! variants that must stay silent on the wire (replay, sequence abuse) map
//! to no status at all.

use thiserror::Error;

use crate::envelope::status;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("header timestamp outside acceptance window")]
    Stale,

    #[error("duplicate handshake nonce")]
    DuplicateNonce,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("KEM failure: {0}")]
    Kem(String),

    #[error("AEAD authentication failed")]
    AeadAuthFail,

    #[error("sequence regression: last accepted {last}, got {got}")]
    SequenceRegression { last: u64, got: u64 },

    #[error("out-of-order frame: expected {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("peer DID unresolved: {0}")]
    UnknownIdentity(String),

    #[error("peer DID revoked: {0}")]
    Revoked(String),

    #[error("no established session with {0}")]
    NoSession(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("invalid handshake state: {0}")]
    InvalidState(&'static str),

    #[error("handshake timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error("frame encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error(transparent)]
    Identity(#[from] qlink_did::DidError),

    #[error(transparent)]
    Crypto(#[from] qlink_pqc::PqcError),
}

impl ProtocolError {
    /// Status code to emit for this failure, or `None` where the failure
    /// table requires a silent drop (replay and sequence abuse stay quiet
    /// to avoid giving an oracle).
    pub fn status_code(&self) -> Option<&'static str> {
        match self {
            Self::Stale => Some(status::ERROR_STALE),
            Self::VerificationFailed => Some(status::ERROR_VERIFICATION_FAILED),
            Self::Kem(_) | Self::Crypto(_) => Some(status::ERROR_KEM),
            Self::UnknownIdentity(_) => Some(status::ERROR_UNKNOWN_IDENTITY),
            Self::Revoked(_) => Some(status::ERROR_REVOKED),
            Self::Timeout | Self::Canceled => Some(status::ERROR_TIMEOUT),
            Self::InvalidPacket(_) | Self::InvalidState(_) | Self::Encoding(_) => {
                Some(status::ERROR_INVALID)
            }
            Self::Identity(e) => Some(match e.code() {
                "ERROR_UNKNOWN_IDENTITY" => status::ERROR_UNKNOWN_IDENTITY,
                "ERROR_REVOKED" => status::ERROR_REVOKED,
                "ERROR_TIMEOUT" => status::ERROR_TIMEOUT,
                _ => status::ERROR_INVALID,
            }),
            Self::DuplicateNonce
            | Self::AeadAuthFail
            | Self::SequenceRegression { .. }
            | Self::OutOfOrder { .. }
            | Self::NoSession(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
