//! Verification methods
//!
//! Key material is carried as a canonical JWK-style record. Some legacy
//! registrations also carry a multibase encoding; readers prefer the JWK
//! whenever both are present.

use serde::{Deserialize, Serialize};

use qlink_pqc::{HybridPublicKey, PublicKeyRecord};

use crate::did::Did;
use crate::error::{DidError, Result};

/// JWS-2020 verification method type
pub const JSON_WEB_KEY_2020: &str = "JsonWebKey2020";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// `<did>#<fragment>`
    pub id: String,

    #[serde(rename = "type")]
    pub type_: String,

    /// The controlling DID
    pub controller: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<PublicKeyRecord>,

    /// Legacy encoding; ignored when `public_key_jwk` is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

impl VerificationMethod {
    /// Create a JWK-carrying verification method owned by `did`
    pub fn new_jwk(did: &Did, fragment: &str, record: PublicKeyRecord) -> Self {
        Self {
            id: format!("{did}#{fragment}"),
            type_: JSON_WEB_KEY_2020.to_string(),
            controller: did.to_string(),
            public_key_jwk: Some(record),
            public_key_multibase: None,
        }
    }

    /// The fragment part of the id, if well-formed
    pub fn fragment(&self) -> Option<&str> {
        self.id.split_once('#').map(|(_, f)| f)
    }

    /// The canonical key record, preferring JWK over the legacy multibase
    /// form when both are present
    pub fn key_record(&self) -> Option<&PublicKeyRecord> {
        self.public_key_jwk.as_ref()
    }

    /// Parse the carried key material into usable public keys
    pub fn public_key(&self) -> Result<HybridPublicKey> {
        let record = self
            .key_record()
            .ok_or_else(|| DidError::Validation(format!("{} carries no JWK", self.id)))?;
        Ok(HybridPublicKey::from_record(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlink_pqc::HybridKeyPair;

    #[test]
    fn test_fragment_and_controller() {
        let pair = HybridKeyPair::generate().unwrap();
        let did = Did::parse(&pair.derive_did()).unwrap();
        let vm = VerificationMethod::new_jwk(&did, "keys-1", pair.to_record());

        assert_eq!(vm.fragment(), Some("keys-1"));
        assert_eq!(vm.controller, did.to_string());
        assert_eq!(vm.id, format!("{did}#keys-1"));
    }

    #[test]
    fn test_jwk_preferred_over_multibase() {
        let pair = HybridKeyPair::generate().unwrap();
        let did = Did::parse(&pair.derive_did()).unwrap();
        let mut vm = VerificationMethod::new_jwk(&did, "keys-1", pair.to_record());
        vm.public_key_multibase = Some("z6MkStaleLegacyEncoding".to_string());

        assert_eq!(vm.key_record(), Some(&pair.to_record()));
        assert_eq!(vm.public_key().unwrap(), pair.public());
    }

    #[test]
    fn test_multibase_only_is_unusable() {
        let vm = VerificationMethod {
            id: "did:qlink:abc#keys-1".to_string(),
            type_: JSON_WEB_KEY_2020.to_string(),
            controller: "did:qlink:abc".to_string(),
            public_key_jwk: None,
            public_key_multibase: Some("z6MkLegacyOnly".to_string()),
        };
        assert!(vm.public_key().is_err());
    }
}
