//! Classical identity signatures
//! ECDSA over P-256 (ES256), signature bytes in fixed 64-byte form

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::Signature;
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{PqcError, Result};

/// Fixed ECDSA P-256 signature size in bytes (r || s)
pub const SIGNATURE_SIZE: usize = 64;
/// Affine coordinate size in bytes, left-zero-padded big-endian
pub const COORDINATE_SIZE: usize = 32;

/// Signature algorithms supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SignatureAlgorithm {
    /// ECDSA over P-256 with SHA-256 (JOSE "ES256")
    #[default]
    Es256,
}

impl SignatureAlgorithm {
    /// Get the signature size in bytes
    pub fn signature_size(&self) -> usize {
        match self {
            Self::Es256 => SIGNATURE_SIZE,
        }
    }

    /// JOSE algorithm identifier
    pub fn jose_alg(&self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
        }
    }

    /// JOSE curve identifier
    pub fn jose_crv(&self) -> &'static str {
        match self {
            Self::Es256 => "P-256",
        }
    }
}

/// Signing key (private half). Never serialized; the underlying scalar is
/// zeroized on drop by the `ecdsa` crate.
#[derive(Clone)]
pub struct SigningKey {
    pub algorithm: SignatureAlgorithm,
    inner: p256::ecdsa::SigningKey,
}

impl SigningKey {
    /// Generate a fresh P-256 signing key
    pub fn generate() -> Result<Self> {
        Ok(Self {
            algorithm: SignatureAlgorithm::Es256,
            inner: p256::ecdsa::SigningKey::random(&mut OsRng),
        })
    }

    /// Sign `data` (hashed with SHA-256 internally).
    ///
    /// ECDSA signature bytes are randomized; any of the possible outputs
    /// verifies against the same message.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let sig: Signature = self.inner.sign(data);
        sig.to_bytes().to_vec()
    }

    /// The matching public half
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            algorithm: self.algorithm,
            inner: self.inner.verifying_key().to_owned(),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Verifying key (public half)
#[derive(Clone)]
pub struct VerifyingKey {
    pub algorithm: SignatureAlgorithm,
    inner: p256::ecdsa::VerifyingKey,
}

impl VerifyingKey {
    /// Verify `signature` over `data`; any failure (including malformed
    /// signature bytes) yields `false`, never an error.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        self.inner.verify(data, &sig).is_ok()
    }

    /// Big-endian affine coordinates, each left-zero-padded to 32 bytes
    pub fn coordinates(&self) -> ([u8; COORDINATE_SIZE], [u8; COORDINATE_SIZE]) {
        let point = self.inner.to_encoded_point(false);
        let mut x = [0u8; COORDINATE_SIZE];
        let mut y = [0u8; COORDINATE_SIZE];
        // Uncompressed SEC1 points always carry both coordinates
        if let (Some(px), Some(py)) = (point.x(), point.y()) {
            x.copy_from_slice(px);
            y.copy_from_slice(py);
        }
        (x, y)
    }

    /// Rebuild from big-endian affine coordinates
    pub fn from_coordinates(x: &[u8], y: &[u8]) -> Result<Self> {
        if x.len() != COORDINATE_SIZE || y.len() != COORDINATE_SIZE {
            return Err(PqcError::InvalidRecord(format!(
                "coordinates must be {COORDINATE_SIZE} bytes, got {}/{}",
                x.len(),
                y.len()
            )));
        }
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(x),
            FieldBytes::from_slice(y),
            false,
        );
        let inner = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
            .map_err(|_| PqcError::InvalidRecord("point not on curve".into()))?;
        Ok(Self {
            algorithm: SignatureAlgorithm::Es256,
            inner,
        })
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (x, _) = self.coordinates();
        f.debug_struct("VerifyingKey")
            .field("algorithm", &self.algorithm)
            .field("x", &hex::encode(&x[..8]))
            .finish()
    }
}

impl PartialEq for VerifyingKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.coordinates() == other.coordinates()
    }
}

impl Eq for VerifyingKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let sk = SigningKey::generate().unwrap();
        let vk = sk.verifying_key();

        let sig = sk.sign(b"qlink handshake");
        assert_eq!(sig.len(), SIGNATURE_SIZE);
        assert!(vk.verify(b"qlink handshake", &sig));
        assert!(!vk.verify(b"qlink handshakf", &sig));
    }

    #[test]
    fn test_malformed_signature_is_false_not_error() {
        let sk = SigningKey::generate().unwrap();
        let vk = sk.verifying_key();

        assert!(!vk.verify(b"data", b""));
        assert!(!vk.verify(b"data", &[0u8; 63]));
        assert!(!vk.verify(b"data", &[0u8; SIGNATURE_SIZE]));
    }

    #[test]
    fn test_coordinate_round_trip() {
        let sk = SigningKey::generate().unwrap();
        let vk = sk.verifying_key();

        let (x, y) = vk.coordinates();
        let rebuilt = VerifyingKey::from_coordinates(&x, &y).unwrap();
        assert_eq!(vk, rebuilt);

        let sig = sk.sign(b"cross-check");
        assert!(rebuilt.verify(b"cross-check", &sig));
    }

    #[test]
    fn test_wrong_size_coordinates_rejected() {
        let err = VerifyingKey::from_coordinates(&[0u8; 31], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, PqcError::InvalidRecord(_)));
    }
}
