//! Symmetric chain-key ratchet
//!
//! Per step: `MK_i = HMAC(CK_i, 0x01)`, `CK_{i+1} = HMAC(CK_i, 0x02)`, and
//! `CK_i` is overwritten. Holding `CK_{i+1}` gives no path back to any
//! earlier message key.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

const MESSAGE_KEY_LABEL: u8 = 0x01;
const CHAIN_KEY_LABEL: u8 = 0x02;

/// One-time AEAD key for a single frame
pub struct MessageKey([u8; 32]);

impl MessageKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Ratchet state for one direction of a session
pub struct ChainKey {
    key: [u8; 32],
    step: u64,
}

impl ChainKey {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, step: 0 }
    }

    /// Number of completed ratchet steps
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Derive the next message key without committing the step. Used on the
    /// receive path so an unauthenticated frame cannot desynchronize the
    /// chain.
    pub fn peek(&self) -> MessageKey {
        MessageKey(hmac_step(&self.key, MESSAGE_KEY_LABEL))
    }

    /// Commit one step: overwrite the chain key with its successor
    pub fn commit(&mut self) {
        let mut next = hmac_step(&self.key, CHAIN_KEY_LABEL);
        self.key.copy_from_slice(&next);
        next.zeroize();
        self.step += 1;
    }

    /// Derive the next message key and advance the chain in one move (send
    /// path)
    pub fn advance(&mut self) -> MessageKey {
        let mk = self.peek();
        self.commit();
        mk
    }
}

impl Drop for ChainKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn hmac_step(key: &[u8; 32], label: u8) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(&[label]);
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
