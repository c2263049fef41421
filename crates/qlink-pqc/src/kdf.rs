//! Key derivation
//! HMAC-SHA-256 extract-and-expand (HKDF, RFC 5869)

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{PqcError, Result};

/// Domain-separation label for session chain keys
pub const SESSION_KEY_INFO: &[u8] = b"qlink/session/v1";

/// KDF trait for key derivation operations
pub trait Kdf {
    /// Extract a pseudorandom key from input keying material
    fn extract(&self, salt: Option<&[u8]>, ikm: &[u8]) -> Vec<u8>;

    /// Expand a pseudorandom key to the desired length
    fn expand(&self, prk: &[u8], info: &[u8], okm_len: usize) -> Result<Vec<u8>>;

    /// Combined extract-and-expand operation
    fn derive(&self, salt: Option<&[u8]>, ikm: &[u8], info: &[u8], okm_len: usize)
        -> Result<Vec<u8>>;
}

/// HKDF over HMAC-SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct HkdfSha256;

impl Kdf for HkdfSha256 {
    fn extract(&self, salt: Option<&[u8]>, ikm: &[u8]) -> Vec<u8> {
        let (prk, _) = Hkdf::<Sha256>::extract(salt, ikm);
        prk.to_vec()
    }

    fn expand(&self, prk: &[u8], info: &[u8], okm_len: usize) -> Result<Vec<u8>> {
        let hk = Hkdf::<Sha256>::from_prk(prk)
            .map_err(|_| PqcError::KdfError("invalid PRK length".into()))?;
        let mut okm = vec![0u8; okm_len];
        hk.expand(info, &mut okm)
            .map_err(|_| PqcError::KdfError("HKDF expand failed".into()))?;
        Ok(okm)
    }

    fn derive(
        &self,
        salt: Option<&[u8]>,
        ikm: &[u8],
        info: &[u8],
        okm_len: usize,
    ) -> Result<Vec<u8>> {
        let prk = self.extract(salt, ikm);
        self.expand(&prk, info, okm_len)
    }
}

/// Derive the initial session chain key from a KEM shared secret.
///
/// Salted with the handshake's `request_id` so two handshakes between the
/// same pair never share chain state.
pub fn initial_chain_key(shared_secret: &[u8; 32], request_id: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(request_id.as_bytes()), shared_secret);
    let mut okm = [0u8; 32];
    hk.expand(SESSION_KEY_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}
