//! Document proofs
//!
//! A proof signs the JSON serialization of the document with the `proof`
//! field elided, so any reader can re-derive the covered bytes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qlink_pqc::HybridKeyPair;

use crate::error::{DidError, Result};

/// JWS-2020 proof type
pub const JSON_WEB_SIGNATURE_2020: &str = "JsonWebSignature2020";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub type_: String,

    pub created: DateTime<Utc>,

    /// Verification method that produced the signature
    pub verification_method: String,

    pub proof_purpose: ProofPurpose,

    /// base64url unpadded signature over the proof-elided document
    pub proof_value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    AssertionMethod,
    Authentication,
    KeyAgreement,
}

impl Proof {
    /// Sign `covered` (the proof-elided document bytes) with the owner's
    /// identity key
    pub fn sign(
        keypair: &HybridKeyPair,
        verification_method: impl Into<String>,
        purpose: ProofPurpose,
        covered: &[u8],
    ) -> Result<Self> {
        let signature = keypair.sign(covered)?;
        Ok(Self {
            type_: JSON_WEB_SIGNATURE_2020.to_string(),
            created: Utc::now(),
            verification_method: verification_method.into(),
            proof_purpose: purpose,
            proof_value: URL_SAFE_NO_PAD.encode(signature),
        })
    }

    /// Decode the signature bytes
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(&self.proof_value)
            .map_err(|e| DidError::Proof(format!("proof value: {e}")))
    }
}
