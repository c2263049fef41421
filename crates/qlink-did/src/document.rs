//! DID documents
//!
//! Owned-value model: verification methods live inside the document and the
//! relation lists (`authentication`, `assertionMethod`, `keyAgreement`) hold
//! string ids only. Relation lists are rebuilt whenever the method set
//! changes; there is no pointer graph to keep consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qlink_pqc::HybridPublicKey;

use crate::did::Did;
use crate::error::{DidError, Result};
use crate::proof::Proof;
use crate::service::Service;
use crate::verification_method::VerificationMethod;

/// DID-core context URI
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
/// JWS-2020 suite context URI
pub const JWS_2020_CONTEXT: &str = "https://w3id.org/security/suites/jws-2020/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Active,
    /// Terminal
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    pub id: String,

    pub verification_method: Vec<VerificationMethod>,

    /// Ids of verification methods usable for authentication
    pub authentication: Vec<String>,

    /// Ids of verification methods usable for assertions
    pub assertion_method: Vec<String>,

    /// Ids of verification methods usable for key agreement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,

    pub status: DocumentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl DidDocument {
    /// Assemble a fresh active document for `did`. Relation lists are
    /// populated from the provided verification methods.
    pub fn new(did: &Did, verification_method: Vec<VerificationMethod>, service: Vec<Service>) -> Self {
        let now = Utc::now();
        let mut doc = Self {
            context: vec![DID_CONTEXT.to_string(), JWS_2020_CONTEXT.to_string()],
            id: did.to_string(),
            verification_method,
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            key_agreement: Vec::new(),
            service,
            created: now,
            updated: now,
            status: DocumentStatus::Active,
            proof: None,
        };
        doc.rebuild_relations();
        doc
    }

    /// Repopulate `authentication` and `assertionMethod` from the current
    /// method set. Must run after every change to `verification_method`.
    pub fn rebuild_relations(&mut self) {
        self.authentication = self.verification_method.iter().map(|m| m.id.clone()).collect();
        self.assertion_method = self.authentication.clone();
    }

    /// Find a verification method by full id or bare fragment
    pub fn find_verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method
            .iter()
            .find(|m| m.id == id || m.fragment() == Some(id))
    }

    /// Structural validation: relations reference present methods, and the
    /// document id matches the fingerprint of one carried key.
    pub fn validate(&self) -> Result<()> {
        let did = Did::parse(&self.id)?;

        for id in self
            .authentication
            .iter()
            .chain(&self.assertion_method)
            .chain(&self.key_agreement)
        {
            if self.find_verification_method(id).is_none() {
                return Err(DidError::Validation(format!(
                    "relation references missing verification method {id}"
                )));
            }
        }

        let matches_fingerprint = self.verification_method.iter().any(|m| {
            m.key_record()
                .map(|r| r.fingerprint() == did.identifier())
                .unwrap_or(false)
        });
        if !matches_fingerprint {
            return Err(DidError::Validation(format!(
                "{} does not match the fingerprint of any verification method",
                self.id
            )));
        }

        Ok(())
    }

    /// Bytes covered by the document proof: the JSON serialization with the
    /// `proof` field elided
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.proof = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Verify the attached proof against the referenced verification method
    pub fn verify_proof(&self) -> Result<()> {
        let proof = self
            .proof
            .as_ref()
            .ok_or_else(|| DidError::Proof("document carries no proof".into()))?;
        let method = self
            .find_verification_method(&proof.verification_method)
            .ok_or_else(|| {
                DidError::Proof(format!(
                    "proof references missing method {}",
                    proof.verification_method
                ))
            })?;

        let covered = self.signing_bytes()?;
        let signature = proof.signature_bytes()?;
        if method.public_key()?.verify(&covered, &signature) {
            Ok(())
        } else {
            Err(DidError::Proof("signature does not cover document".into()))
        }
    }

    /// The peer's hybrid public key, taken from the first authentication
    /// method carrying usable key material
    pub fn public_key(&self) -> Result<HybridPublicKey> {
        self.authentication
            .iter()
            .filter_map(|id| self.find_verification_method(id))
            .find_map(|m| m.public_key().ok())
            .ok_or_else(|| {
                DidError::Validation(format!("{} has no usable authentication key", self.id))
            })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
