//! DID string type
//!
//! Canonical shape: `did:<method>:<identifier>` where the method token is
//! lower-case alphanumeric and the identifier is non-empty `[a-zA-Z0-9._-]`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DidError;

pub use qlink_pqc::DID_METHOD;

static DID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^did:([a-z0-9]+):([a-zA-Z0-9._-]+)$").expect("static regex"));

/// A validated DID string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Did(String);

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Did::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Did {
    /// Parse and validate a DID string; rejects anything outside the
    /// canonical shape.
    pub fn parse(s: &str) -> Result<Self, DidError> {
        if DID_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(DidError::InvalidDid(s.to_string()))
        }
    }

    /// Build the deployment-method DID for a key fingerprint
    pub fn for_fingerprint(fingerprint: &str) -> Result<Self, DidError> {
        Self::parse(&format!("did:{DID_METHOD}:{fingerprint}"))
    }

    /// The method token (e.g. `qlink`)
    pub fn method(&self) -> &str {
        // Validated at construction; both separators are present.
        let rest = &self.0["did:".len()..];
        &rest[..rest.find(':').expect("validated did has a method separator")]
    }

    /// The method-specific identifier
    pub fn identifier(&self) -> &str {
        let rest = &self.0["did:".len()..];
        &rest[rest.find(':').expect("validated did has a method separator") + 1..]
    }

    /// True when the method token matches this deployment's namespace
    pub fn is_supported_method(&self) -> bool {
        self.method() == DID_METHOD
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
