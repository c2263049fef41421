//! Packet envelope
//!
//! Every frame is `{Header, payload}` with exactly one payload variant.
//! The header's canonical byte form is what handshake signatures cover;
//! both sides must agree on it byte-for-byte.

use bincode::Options;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use qlink_did::DidDocument;

use crate::error::Result;

/// Upper bound on an encoded frame
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Stable wire status codes
pub mod status {
    pub const OK: &str = "OK";
    pub const ERROR_STALE: &str = "ERROR_STALE";
    pub const ERROR_VERIFICATION_FAILED: &str = "ERROR_VERIFICATION_FAILED";
    pub const ERROR_KEM: &str = "ERROR_KEM";
    pub const ERROR_UNKNOWN_IDENTITY: &str = "ERROR_UNKNOWN_IDENTITY";
    pub const ERROR_REVOKED: &str = "ERROR_REVOKED";
    pub const ERROR_CONFLICT: &str = "ERROR_CONFLICT";
    pub const ERROR_INVALID: &str = "ERROR_INVALID";
    pub const ERROR_TIMEOUT: &str = "ERROR_TIMEOUT";
}

fn frame_bincode() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_FRAME_LEN as u64)
}

/// Routing and freshness context carried by every frame.
///
/// Intermediaries route on `to_did` alone; they hold no DID documents and
/// cannot validate anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// UUID, unique per request within the acceptance window
    pub request_id: String,
    pub from_did: String,
    pub to_did: String,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl Header {
    /// Fresh header with a new request id and the current time
    pub fn new(from_did: impl Into<String>, to_did: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            from_did: from_did.into(),
            to_did: to_did.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Reply header echoing `request_id`, with sender and receiver swapped
    pub fn reply_to(&self, from_did: impl Into<String>) -> Self {
        Self {
            request_id: self.request_id.clone(),
            from_did: from_did.into(),
            to_did: self.from_did.clone(),
            timestamp_ms: now_ms(),
        }
    }

    /// Canonical byte form:
    /// `request_id || from_did || to_did || u64_be(timestamp_ms)`
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.request_id.len() + self.from_did.len() + self.to_did.len() + 8,
        );
        out.extend_from_slice(self.request_id.as_bytes());
        out.extend_from_slice(self.from_did.as_bytes());
        out.extend_from_slice(self.to_did.as_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KemInit {
    /// ML-KEM-768 ciphertext encapsulated to the responder (1088 bytes)
    pub ct: Vec<u8>,
    /// Single-use handshake nonce
    pub nonce: [u8; 32],
    /// Covers `header.signing_bytes() || ct || nonce`
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KemConfirm {
    /// SHA-256 of the KEMInit nonce
    pub nonce_hash: [u8; 32],
    /// Covers `header.signing_bytes() || nonce_hash`
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureMessage {
    /// Strictly increasing per direction, starting at 1
    pub sequence_number: u64,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
    pub tag: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidRequest {
    pub target_did: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidResponse {
    pub document: Option<DidDocument>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Request id of the frame this answers
    pub reply_to_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    KemInit(KemInit),
    KemConfirm(KemConfirm),
    SecureMessage(SecureMessage),
    DidRequest(DidRequest),
    DidResponse(DidResponse),
    Status(Status),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KemInit(_) => "KEMInit",
            Self::KemConfirm(_) => "KEMConfirm",
            Self::SecureMessage(_) => "SecureMessage",
            Self::DidRequest(_) => "DIDRequest",
            Self::DidResponse(_) => "DIDResponse",
            Self::Status(_) => "Status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub header: Header,
    pub payload: Payload,
}

impl Packet {
    pub fn new(header: Header, payload: Payload) -> Self {
        Self { header, payload }
    }

    /// Status frame answering `answering`
    pub fn status(answering: &Header, from_did: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            header: Header::new(from_did, &answering.from_did),
            payload: Payload::Status(Status {
                reply_to_id: answering.request_id.clone(),
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(frame_bincode().serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(frame_bincode().deserialize(bytes)?)
    }
}

/// Bytes covered by `KemInit.signature`
pub fn kem_init_signing_bytes(header: &Header, ct: &[u8], nonce: &[u8; 32]) -> Vec<u8> {
    let mut out = header.signing_bytes();
    out.extend_from_slice(ct);
    out.extend_from_slice(nonce);
    out
}

/// Bytes covered by `KemConfirm.signature`
pub fn kem_confirm_signing_bytes(header: &Header, nonce_hash: &[u8; 32]) -> Vec<u8> {
    let mut out = header.signing_bytes();
    out.extend_from_slice(nonce_hash);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_signing_bytes_layout() {
        let header = Header {
            request_id: "req-1".to_string(),
            from_did: "did:qlink:aaa".to_string(),
            to_did: "did:qlink:bbb".to_string(),
            timestamp_ms: 0x0102030405060708,
        };
        let bytes = header.signing_bytes();
        assert_eq!(&bytes[..5], b"req-1");
        assert_eq!(&bytes[5..18], b"did:qlink:aaa");
        assert_eq!(&bytes[18..31], b"did:qlink:bbb");
        assert_eq!(&bytes[31..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_every_header_field_perturbs_signing_bytes() {
        let base = Header {
            request_id: "req-1".to_string(),
            from_did: "did:qlink:aaa".to_string(),
            to_did: "did:qlink:bbb".to_string(),
            timestamp_ms: 1_000,
        };
        let reference = base.signing_bytes();

        let mut h = base.clone();
        h.request_id = "req-2".to_string();
        assert_ne!(h.signing_bytes(), reference);

        let mut h = base.clone();
        h.from_did = "did:qlink:aax".to_string();
        assert_ne!(h.signing_bytes(), reference);

        let mut h = base.clone();
        h.to_did = "did:qlink:bbx".to_string();
        assert_ne!(h.signing_bytes(), reference);

        let mut h = base;
        h.timestamp_ms = 1_001;
        assert_ne!(h.signing_bytes(), reference);
    }

    #[test]
    fn test_packet_codec_round_trip() {
        let packet = Packet::new(
            Header::new("did:qlink:aaa", "did:qlink:bbb"),
            Payload::SecureMessage(SecureMessage {
                sequence_number: 7,
                ciphertext: vec![1, 2, 3],
                nonce: [9; 12],
                tag: [8; 16],
            }),
        );
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_codec_rejects_garbage() {
        assert!(Packet::from_bytes(&[0xFF; 64]).is_err());
    }

    #[test]
    fn test_reply_header_echoes_request_id() {
        let request = Header::new("did:qlink:aaa", "did:qlink:bbb");
        let reply = request.reply_to("did:qlink:bbb");
        assert_eq!(reply.request_id, request.request_id);
        assert_eq!(reply.to_did, "did:qlink:aaa");
        assert_eq!(reply.from_did, "did:qlink:bbb");
    }
}
