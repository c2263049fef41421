//! Hybrid post-quantum key bundle for QLink identities
//!
//! Pairs a classical ECDSA P-256 signature key with an ML-KEM-768 (FIPS 203)
//! encapsulation key. The public halves serialize to a canonical JWK-style
//! record whose SHA-256 fingerprint anchors the owner's DID.

pub mod errors;
pub mod kdf;
pub mod kem;
pub mod keypair;
pub mod signature;

pub use errors::{PqcError, Result};
pub use kdf::{initial_chain_key, HkdfSha256, Kdf, SESSION_KEY_INFO};
pub use kem::{
    DecapsulationKey, EncapsulationKey, KemAlgorithm, KemKeyPair, KemOutput, KEM_CIPHERTEXT_SIZE,
    KEM_PUBLIC_KEY_SIZE, KEM_SHARED_SECRET_SIZE,
};
pub use keypair::{HybridKeyPair, HybridPublicKey, PublicKeyRecord, DID_METHOD};
pub use signature::{SignatureAlgorithm, SigningKey, VerifyingKey, SIGNATURE_SIZE};
