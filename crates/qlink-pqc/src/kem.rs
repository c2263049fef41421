//! Key Encapsulation Mechanism (KEM)
//! FIPS 203 ML-KEM-768 via the pure-Rust `ml-kem` crate

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem768, MlKem768Params};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{PqcError, Result};

type Ek = ml_kem::kem::EncapsulationKey<MlKem768Params>;
type Dk = ml_kem::kem::DecapsulationKey<MlKem768Params>;
type MlKemCt = Ciphertext<MlKem768>;

/// ML-KEM-768 encapsulation key size in bytes (per FIPS 203)
pub const KEM_PUBLIC_KEY_SIZE: usize = 1184;
/// ML-KEM-768 ciphertext size in bytes (per FIPS 203)
pub const KEM_CIPHERTEXT_SIZE: usize = 1088;
/// ML-KEM shared secret size in bytes
pub const KEM_SHARED_SECRET_SIZE: usize = 32;

/// KEM algorithms supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KemAlgorithm {
    /// ML-KEM-768 (NIST Level 3 - 192-bit security)
    #[default]
    MlKem768,
}

impl KemAlgorithm {
    /// Get the encapsulation key size in bytes
    pub fn encap_key_size(&self) -> usize {
        match self {
            Self::MlKem768 => KEM_PUBLIC_KEY_SIZE,
        }
    }

    /// Get the ciphertext size in bytes
    pub fn ciphertext_size(&self) -> usize {
        match self {
            Self::MlKem768 => KEM_CIPHERTEXT_SIZE,
        }
    }

    /// Get the shared secret size (always 32 bytes for ML-KEM)
    pub fn shared_secret_size(&self) -> usize {
        KEM_SHARED_SECRET_SIZE
    }
}

/// Encapsulation key (public key for KEM)
#[derive(Clone)]
pub struct EncapsulationKey {
    pub algorithm: KemAlgorithm,
    inner: Ek,
}

impl EncapsulationKey {
    pub(crate) fn from_inner(inner: Ek) -> Self {
        Self {
            algorithm: KemAlgorithm::MlKem768,
            inner,
        }
    }

    /// Serialize to the FIPS 203 byte encoding (1184 bytes)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.as_bytes().to_vec()
    }

    /// Parse from the FIPS 203 byte encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEM_PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PqcError::InvalidRecord(format!("KEM key must be {KEM_PUBLIC_KEY_SIZE} bytes, got {}", bytes.len())))?;
        Ok(Self::from_inner(Ek::from_bytes(&arr.into())))
    }

    /// Encapsulate: generate a fresh `(ciphertext, shared_secret)` pair
    pub fn encapsulate(&self) -> Result<KemOutput> {
        let (ct, ss) = self
            .inner
            .encapsulate(&mut OsRng)
            .map_err(|_| PqcError::KeyGenFailed("ML-KEM encapsulation failed".into()))?;

        let mut shared_secret = [0u8; KEM_SHARED_SECRET_SIZE];
        shared_secret.copy_from_slice(ss.as_slice());

        Ok(KemOutput {
            ciphertext: ct.as_slice().to_vec(),
            shared_secret,
        })
    }
}

impl std::fmt::Debug for EncapsulationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncapsulationKey")
            .field("algorithm", &self.algorithm)
            .field("key", &hex::encode(&self.to_bytes()[..8]))
            .finish()
    }
}

impl PartialEq for EncapsulationKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for EncapsulationKey {}

/// Decapsulation key (private key for KEM).
///
/// Never serialized; the inner key material is zeroized by `ml-kem` on drop.
pub struct DecapsulationKey {
    pub algorithm: KemAlgorithm,
    inner: Dk,
}

impl DecapsulationKey {
    /// Decapsulate a peer-produced ciphertext into the shared secret
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<[u8; KEM_SHARED_SECRET_SIZE]> {
        let ct = MlKemCt::try_from(ciphertext).map_err(|_| {
            PqcError::InvalidCiphertext(format!(
                "expected {KEM_CIPHERTEXT_SIZE} bytes, got {}",
                ciphertext.len()
            ))
        })?;

        // ML-KEM uses implicit rejection: a malformed-but-well-sized
        // ciphertext yields an unrelated secret rather than an error.
        let ss = self
            .inner
            .decapsulate(&ct)
            .map_err(|_| PqcError::InvalidCiphertext("decapsulation failed".into()))?;

        let mut shared_secret = [0u8; KEM_SHARED_SECRET_SIZE];
        shared_secret.copy_from_slice(ss.as_slice());
        Ok(shared_secret)
    }
}

/// KEM key pair
pub struct KemKeyPair {
    pub encap_key: EncapsulationKey,
    pub decap_key: DecapsulationKey,
}

impl KemKeyPair {
    /// Generate a new ML-KEM-768 key pair
    pub fn generate() -> Result<Self> {
        // `generate` returns (dk, ek)
        let (dk, ek) = MlKem768::generate(&mut OsRng);
        Ok(Self {
            encap_key: EncapsulationKey::from_inner(ek),
            decap_key: DecapsulationKey {
                algorithm: KemAlgorithm::MlKem768,
                inner: dk,
            },
        })
    }
}

/// KEM ciphertext and shared secret
pub struct KemOutput {
    pub ciphertext: Vec<u8>,
    pub shared_secret: [u8; KEM_SHARED_SECRET_SIZE],
}

impl Drop for KemOutput {
    fn drop(&mut self) {
        self.shared_secret.zeroize();
    }
}
