//! Two-message authenticated handshake
//!
//! KEMInit (A→B) carries a KEM ciphertext and a 32-byte nonce under the
//! initiator's identity signature; KEMConfirm (B→A) echoes the request id
//! and signs the nonce hash. Afterwards both sides derive byte-equal
//! initial chain keys from the KEM shared secret alone.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Instant;
use zeroize::Zeroize;

use qlink_did::{Did, DidDocument, DidError, Resolve};
use qlink_pqc::HybridKeyPair;

use crate::config::ProtocolConfig;
use crate::envelope::{
    kem_confirm_signing_bytes, kem_init_signing_bytes, now_ms, Header, KemConfirm, KemInit,
    Packet, Payload,
};
use crate::error::{ProtocolError, Result};
use crate::replay::NonceCache;
use crate::session::Session;

use std::sync::Arc;

/// This endpoint's long-term identity: the hybrid key bundle and the DID
/// derived from its public record
#[derive(Clone)]
pub struct Identity {
    pub did: Did,
    pub keypair: Arc<HybridKeyPair>,
}

impl Identity {
    pub fn new(keypair: HybridKeyPair) -> Result<Self> {
        let did = Did::parse(&keypair.derive_did())?;
        Ok(Self {
            did,
            keypair: Arc::new(keypair),
        })
    }
}

/// Initiator-side state between KEMInit and KEMConfirm (`AwaitConfirm`).
/// The shared secret and nonce are zeroized on drop.
pub struct PendingHandshake {
    peer: Did,
    request_id: String,
    nonce: [u8; 32],
    shared_secret: [u8; 32],
    deadline: Instant,
}

impl std::fmt::Debug for PendingHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandshake")
            .field("peer", &self.peer)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl PendingHandshake {
    pub fn peer(&self) -> &Did {
        &self.peer
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Past the overall handshake timeout
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

impl Drop for PendingHandshake {
    fn drop(&mut self) {
        self.nonce.zeroize();
        self.shared_secret.zeroize();
    }
}

/// Resolve a handshake peer, mapping registry outcomes onto protocol
/// failures
async fn resolve_peer<R: Resolve>(resolver: &R, did: &str) -> Result<DidDocument> {
    resolver.resolve(did).await.map_err(|e| match e {
        DidError::NotFound(did) | DidError::InvalidDid(did) => ProtocolError::UnknownIdentity(did),
        DidError::Revoked(did) => ProtocolError::Revoked(did),
        other => ProtocolError::Identity(other),
    })
}

/// A-side step 1: resolve the responder, encapsulate to its KEM key and
/// emit a signed KEMInit. A resolution failure (unknown or revoked peer)
/// aborts before any packet exists.
pub async fn initiate<R: Resolve>(
    identity: &Identity,
    resolver: &R,
    peer_did: &str,
    config: &ProtocolConfig,
) -> Result<(Packet, PendingHandshake)> {
    let peer = Did::parse(peer_did)?;
    let doc = resolve_peer(resolver, peer.as_str()).await?;
    let peer_key = doc.public_key()?;

    let output = peer_key
        .encapsulate()
        .map_err(|e| ProtocolError::Kem(e.to_string()))?;
    let ct = output.ciphertext.clone();
    let shared_secret = output.shared_secret;

    let mut nonce = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let header = Header::new(identity.did.as_str(), peer.as_str());
    let signature = identity
        .keypair
        .sign(&kem_init_signing_bytes(&header, &ct, &nonce))?;

    let pending = PendingHandshake {
        peer,
        request_id: header.request_id.clone(),
        nonce,
        shared_secret,
        deadline: Instant::now() + config.handshake_timeout,
    };
    let packet = Packet::new(
        header,
        Payload::KemInit(KemInit {
            ct,
            nonce,
            signature,
        }),
    );
    Ok((packet, pending))
}

/// B-side: validate a KEMInit (freshness, replay, signature), decapsulate,
/// and emit the signed KEMConfirm together with the established session.
pub async fn respond<R: Resolve>(
    identity: &Identity,
    resolver: &R,
    nonces: &NonceCache,
    config: &ProtocolConfig,
    header: &Header,
    init: &KemInit,
) -> Result<(Packet, Session)> {
    let now = now_ms();
    if now.abs_diff(header.timestamp_ms) > config.skew_window.as_millis() as u64 {
        return Err(ProtocolError::Stale);
    }
    if header.to_did != identity.did.as_str() {
        return Err(ProtocolError::InvalidPacket(format!(
            "addressed to {}",
            header.to_did
        )));
    }
    if !nonces.observe(
        &header.from_did,
        &header.request_id,
        header.timestamp_ms,
        config.skew_window,
        now,
    ) {
        return Err(ProtocolError::DuplicateNonce);
    }

    let peer_doc = resolve_peer(resolver, &header.from_did).await?;
    let covered = kem_init_signing_bytes(header, &init.ct, &init.nonce);
    if !peer_doc.public_key()?.verify(&covered, &init.signature) {
        return Err(ProtocolError::VerificationFailed);
    }

    let shared_secret = identity
        .keypair
        .decapsulate(&init.ct)
        .map_err(|e| ProtocolError::Kem(e.to_string()))?;

    let nonce_hash: [u8; 32] = Sha256::digest(init.nonce).into();
    let reply = header.reply_to(identity.did.as_str());
    let signature = identity
        .keypair
        .sign(&kem_confirm_signing_bytes(&reply, &nonce_hash))?;

    let peer = Did::parse(&header.from_did)?;
    let session = Session::establish(peer, &header.request_id, &shared_secret, config);
    let packet = Packet::new(
        reply,
        Payload::KemConfirm(KemConfirm {
            nonce_hash,
            signature,
        }),
    );
    Ok((packet, session))
}

/// A-side step 2: validate the KEMConfirm against the pending state and
/// establish the session
pub async fn complete<R: Resolve>(
    resolver: &R,
    pending: &PendingHandshake,
    config: &ProtocolConfig,
    header: &Header,
    confirm: &KemConfirm,
) -> Result<Session> {
    if pending.expired(Instant::now()) {
        return Err(ProtocolError::Timeout);
    }
    if header.request_id != pending.request_id {
        return Err(ProtocolError::InvalidPacket("request id mismatch".into()));
    }
    if header.from_did != pending.peer.as_str() {
        return Err(ProtocolError::InvalidPacket("unexpected responder".into()));
    }

    let peer_doc = resolve_peer(resolver, pending.peer.as_str()).await?;
    let covered = kem_confirm_signing_bytes(header, &confirm.nonce_hash);
    if !peer_doc.public_key()?.verify(&covered, &confirm.signature) {
        return Err(ProtocolError::VerificationFailed);
    }

    let expected: [u8; 32] = Sha256::digest(pending.nonce).into();
    if confirm.nonce_hash != expected {
        return Err(ProtocolError::VerificationFailed);
    }

    Ok(Session::establish(
        pending.peer.clone(),
        &pending.request_id,
        &pending.shared_secret,
        config,
    ))
}
