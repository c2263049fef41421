//! Hybrid long-term key bundle
//!
//! One bundle per identity: an ES256 signing half plus an ML-KEM-768
//! encapsulation half. The canonical public record is a JWK-style JSON
//! object; its SHA-256 fingerprint (first 16 bytes, base64url unpadded)
//! is the method-specific identifier of the owner's DID.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::kem::{
    DecapsulationKey, EncapsulationKey, KemKeyPair, KemOutput, KEM_PUBLIC_KEY_SIZE,
    KEM_SHARED_SECRET_SIZE,
};
use crate::signature::{SigningKey, VerifyingKey, COORDINATE_SIZE};
use crate::{PqcError, Result};

/// DID method namespace for this deployment
pub const DID_METHOD: &str = "qlink";

/// Canonical JWK-style public-key record.
///
/// Field order is load-bearing: the fingerprint hashes the serialized JSON,
/// and implementations must agree byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub crv: String,
    /// base64url unpadded, 32-byte big-endian X coordinate
    pub x: String,
    /// base64url unpadded, 32-byte big-endian Y coordinate
    pub y: String,
    /// base64url unpadded ML-KEM-768 encapsulation key
    pub kem: String,
}

impl PublicKeyRecord {
    /// Canonical JSON bytes (declaration field order)
    pub fn canonical_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("public-key record serialization is infallible")
    }

    /// Fingerprint: first 16 bytes of SHA-256 over the canonical JSON,
    /// base64url unpadded (22 characters)
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.canonical_json());
        URL_SAFE_NO_PAD.encode(&digest[..16])
    }

    /// Reject records with unknown algorithms or malformed key material
    pub fn validate(&self) -> Result<()> {
        if self.kty != "EC" {
            return Err(PqcError::InvalidRecord(format!("unknown kty {:?}", self.kty)));
        }
        if self.alg != "ES256" {
            return Err(PqcError::InvalidRecord(format!("unknown alg {:?}", self.alg)));
        }
        if self.use_ != "sig" {
            return Err(PqcError::InvalidRecord(format!("unknown use {:?}", self.use_)));
        }
        if self.crv != "P-256" {
            return Err(PqcError::InvalidRecord(format!("unknown crv {:?}", self.crv)));
        }
        for (name, value, expected) in [
            ("x", &self.x, COORDINATE_SIZE),
            ("y", &self.y, COORDINATE_SIZE),
            ("kem", &self.kem, KEM_PUBLIC_KEY_SIZE),
        ] {
            let bytes = decode_b64(name, value)?;
            if bytes.len() != expected {
                return Err(PqcError::InvalidRecord(format!(
                    "{name} must decode to {expected} bytes, got {}",
                    bytes.len()
                )));
            }
        }
        Ok(())
    }
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| PqcError::InvalidRecord(format!("{field}: {e}")))
}

/// Public halves of a hybrid bundle; the handle held for peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridPublicKey {
    pub verifying: VerifyingKey,
    pub encap: EncapsulationKey,
}

impl HybridPublicKey {
    /// Verify an identity signature; never errors
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        self.verifying.verify(data, signature)
    }

    /// Encapsulate to this peer's KEM half
    pub fn encapsulate(&self) -> Result<KemOutput> {
        self.encap.encapsulate()
    }

    /// Canonical JWK-style record
    pub fn to_record(&self) -> PublicKeyRecord {
        let (x, y) = self.verifying.coordinates();
        PublicKeyRecord {
            kty: "EC".to_string(),
            alg: "ES256".to_string(),
            use_: "sig".to_string(),
            crv: "P-256".to_string(),
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
            kem: URL_SAFE_NO_PAD.encode(self.encap.to_bytes()),
        }
    }

    /// Parse and validate a record back into usable keys
    pub fn from_record(record: &PublicKeyRecord) -> Result<Self> {
        record.validate()?;
        let x = decode_b64("x", &record.x)?;
        let y = decode_b64("y", &record.y)?;
        let kem = decode_b64("kem", &record.kem)?;

        Ok(Self {
            verifying: VerifyingKey::from_coordinates(&x, &y)?,
            encap: EncapsulationKey::from_bytes(&kem)?,
        })
    }

    pub fn fingerprint(&self) -> String {
        self.to_record().fingerprint()
    }

    /// `did:qlink:<fingerprint>`
    pub fn derive_did(&self) -> String {
        format!("did:{}:{}", DID_METHOD, self.fingerprint())
    }
}

/// Full hybrid bundle with private halves.
///
/// Private halves never leave process memory and never serialize. The key
/// lock is held for the full duration of every signing and decapsulation
/// call; the guard's scope guarantees release on all exits.
pub struct HybridKeyPair {
    signing: Option<SigningKey>,
    verifying: VerifyingKey,
    decap: Option<DecapsulationKey>,
    encap: EncapsulationKey,
    key_lock: Mutex<()>,
}

impl HybridKeyPair {
    /// Generate both halves with OS randomness
    pub fn generate() -> Result<Self> {
        // Probe the RNG once so a dead entropy source surfaces as
        // KeyGenFailed instead of a panic inside the curve library.
        let mut probe = [0u8; 16];
        getrandom::getrandom(&mut probe).map_err(|e| PqcError::KeyGenFailed(e.to_string()))?;

        let signing = SigningKey::generate()?;
        let verifying = signing.verifying_key();
        let KemKeyPair {
            encap_key,
            decap_key,
        } = KemKeyPair::generate()?;

        Ok(Self {
            signing: Some(signing),
            verifying,
            decap: Some(decap_key),
            encap: encap_key,
            key_lock: Mutex::new(()),
        })
    }

    /// Build a public-only handle (no signing, no decapsulation)
    pub fn from_public(public: HybridPublicKey) -> Self {
        Self {
            signing: None,
            verifying: public.verifying,
            decap: None,
            encap: public.encap,
            key_lock: Mutex::new(()),
        }
    }

    /// Sign `data` with the classical identity key
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let _guard = self.key_lock.lock();
        let signing = self.signing.as_ref().ok_or(PqcError::NoSigningKey)?;
        Ok(signing.sign(data))
    }

    /// Verify a signature against the bundle's public half
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        self.verifying.verify(data, signature)
    }

    /// Recover the shared secret from a peer-produced ciphertext
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<[u8; KEM_SHARED_SECRET_SIZE]> {
        let _guard = self.key_lock.lock();
        let decap = self.decap.as_ref().ok_or(PqcError::NoDecapsulationKey)?;
        decap.decapsulate(ciphertext)
    }

    /// Public halves
    pub fn public(&self) -> HybridPublicKey {
        HybridPublicKey {
            verifying: self.verifying.clone(),
            encap: self.encap.clone(),
        }
    }

    pub fn to_record(&self) -> PublicKeyRecord {
        self.public().to_record()
    }

    pub fn fingerprint(&self) -> String {
        self.public().fingerprint()
    }

    /// `did:qlink:<fingerprint>`
    pub fn derive_did(&self) -> String {
        self.public().derive_did()
    }
}

impl std::fmt::Debug for HybridKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridKeyPair")
            .field("did", &self.derive_did())
            .field("has_private", &self.signing.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_law() {
        let pair = HybridKeyPair::generate().unwrap();
        let sig = pair.sign(b"message").unwrap();
        assert!(pair.verify(b"message", &sig));
    }

    #[test]
    fn test_kem_law() {
        let pair = HybridKeyPair::generate().unwrap();
        let out = pair.public().encapsulate().unwrap();
        let recovered = pair.decapsulate(&out.ciphertext).unwrap();
        assert_eq!(out.shared_secret, recovered);
    }

    #[test]
    fn test_public_only_cannot_sign_or_decapsulate() {
        let pair = HybridKeyPair::generate().unwrap();
        let public_only = HybridKeyPair::from_public(pair.public());

        assert!(matches!(
            public_only.sign(b"x").unwrap_err(),
            PqcError::NoSigningKey
        ));
        let out = pair.public().encapsulate().unwrap();
        assert!(matches!(
            public_only.decapsulate(&out.ciphertext).unwrap_err(),
            PqcError::NoDecapsulationKey
        ));
        // Verification still works on the public half
        let sig = pair.sign(b"x").unwrap();
        assert!(public_only.verify(b"x", &sig));
    }

    #[test]
    fn test_record_round_trip() {
        let pair = HybridKeyPair::generate().unwrap();
        let record = pair.to_record();
        let parsed = HybridPublicKey::from_record(&record).unwrap();
        assert_eq!(parsed, pair.public());
        assert_eq!(parsed.to_record(), record);
    }

    #[test]
    fn test_fingerprint_is_22_chars() {
        let pair = HybridKeyPair::generate().unwrap();
        let fp = pair.fingerprint();
        assert_eq!(fp.len(), 22);
        assert_eq!(pair.derive_did(), format!("did:qlink:{fp}"));
    }

    #[test]
    fn test_record_rejects_unknown_algorithm() {
        let pair = HybridKeyPair::generate().unwrap();
        let mut record = pair.to_record();
        record.alg = "RS256".to_string();
        assert!(matches!(
            HybridPublicKey::from_record(&record).unwrap_err(),
            PqcError::InvalidRecord(_)
        ));
    }

    #[test]
    fn test_fingerprint_tracks_record_content() {
        let a = HybridKeyPair::generate().unwrap();
        let b = HybridKeyPair::generate().unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
