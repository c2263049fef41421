//! Crypto error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PqcError {
    #[error("key generation failed: {0}")]
    KeyGenFailed(String),

    #[error("no signing key available")]
    NoSigningKey,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("invalid KEM ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("no decapsulation key available")]
    NoDecapsulationKey,

    #[error("invalid public-key record: {0}")]
    InvalidRecord(String),

    #[error("key derivation failed: {0}")]
    KdfError(String),
}

pub type Result<T> = std::result::Result<T, PqcError>;
