//! Established sessions and the secure-message transport
//!
//! Both directions of a session start from the same initial chain key and
//! ratchet independently, in lockstep with that direction's sequence
//! numbers. Payloads are sealed with AES-256-GCM under the per-message key,
//! with the sequence number and canonical header bound as associated data.

use aes_gcm::aead::{Aead, KeyInit, Payload as AeadPayload};
use aes_gcm::{Aes256Gcm, Nonce};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use qlink_did::Did;
use qlink_pqc::initial_chain_key;

use crate::config::ProtocolConfig;
use crate::envelope::{Header, SecureMessage};
use crate::error::{ProtocolError, Result};
use crate::ratchet::ChainKey;

const TAG_SIZE: usize = 16;

/// Per-side handshake and session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitConfirm,
    Established,
    Closing,
    Closed,
    Failed,
}

/// Associated data for a frame: `u64_be(seq) || header.signing_bytes()`
pub(crate) fn associated_data(header: &Header, sequence_number: u64) -> Vec<u8> {
    let mut aad = sequence_number.to_be_bytes().to_vec();
    aad.extend_from_slice(&header.signing_bytes());
    aad
}

/// A live peer session. Owned exclusively by the session manager; chain
/// keys are zeroized when the session drops.
pub struct Session {
    peer: Did,
    request_id: String,
    state: SessionState,
    send_chain: ChainKey,
    recv_chain: ChainKey,
    next_send_seq: u64,
    last_recv_seq: u64,
    established_at: Instant,
    expires_at: Instant,
    last_activity: Instant,
    auth_failures: u32,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("request_id", &self.request_id)
            .field("state", &self.state)
            .field("next_send_seq", &self.next_send_seq)
            .field("last_recv_seq", &self.last_recv_seq)
            .field("auth_failures", &self.auth_failures)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Derive session state from a completed handshake. Both sides call
    /// this with the same shared secret and request id and obtain
    /// byte-equal initial chain keys.
    pub fn establish(
        peer: Did,
        request_id: &str,
        shared_secret: &[u8; 32],
        config: &ProtocolConfig,
    ) -> Self {
        let ck0 = initial_chain_key(shared_secret, request_id);
        let now = Instant::now();
        Self {
            peer,
            request_id: request_id.to_string(),
            state: SessionState::Established,
            send_chain: ChainKey::new(ck0),
            recv_chain: ChainKey::new(ck0),
            next_send_seq: 1,
            last_recv_seq: 0,
            established_at: now,
            expires_at: now + config.session_ttl,
            last_activity: now,
            auth_failures: 0,
        }
    }

    pub fn peer(&self) -> &Did {
        &self.peer
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    pub fn auth_failures(&self) -> u32 {
        self.auth_failures
    }

    /// Seal a payload for the peer, ratcheting the send chain forward.
    /// The spent chain key is overwritten before this returns.
    pub fn seal(&mut self, header: &Header, plaintext: &[u8]) -> Result<SecureMessage> {
        if self.state != SessionState::Established {
            return Err(ProtocolError::InvalidState("session not established"));
        }

        let sequence_number = self.next_send_seq;
        let message_key = self.send_chain.advance();
        let cipher = Aes256Gcm::new_from_slice(message_key.as_bytes())
            .expect("message keys are 32 bytes");

        let mut nonce = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let aad = associated_data(header, sequence_number);
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                AeadPayload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| ProtocolError::InvalidState("AEAD encryption failed"))?;

        let split = sealed.len() - TAG_SIZE;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&sealed[split..]);

        self.next_send_seq += 1;
        self.last_activity = Instant::now();

        Ok(SecureMessage {
            sequence_number,
            ciphertext: sealed[..split].to_vec(),
            nonce,
            tag,
        })
    }

    /// Open an inbound frame. The receive chain only commits after the
    /// frame authenticates, so forged frames cannot desynchronize it.
    /// Delivery is strictly in-order.
    pub fn open(&mut self, header: &Header, message: &SecureMessage) -> Result<Vec<u8>> {
        if self.state != SessionState::Established {
            return Err(ProtocolError::InvalidState("session not established"));
        }

        let seq = message.sequence_number;
        if seq <= self.last_recv_seq {
            return Err(ProtocolError::SequenceRegression {
                last: self.last_recv_seq,
                got: seq,
            });
        }
        let expected = self.last_recv_seq + 1;
        if seq != expected {
            return Err(ProtocolError::OutOfOrder { expected, got: seq });
        }

        let message_key = self.recv_chain.peek();
        let cipher = Aes256Gcm::new_from_slice(message_key.as_bytes())
            .expect("message keys are 32 bytes");

        let mut sealed = message.ciphertext.clone();
        sealed.extend_from_slice(&message.tag);
        let aad = associated_data(header, seq);

        match cipher.decrypt(
            Nonce::from_slice(&message.nonce),
            AeadPayload {
                msg: &sealed,
                aad: &aad,
            },
        ) {
            Ok(plaintext) => {
                self.recv_chain.commit();
                self.last_recv_seq = seq;
                self.last_activity = Instant::now();
                Ok(plaintext)
            }
            Err(_) => {
                self.auth_failures += 1;
                Err(ProtocolError::AeadAuthFail)
            }
        }
    }

    /// Begin tear-down
    pub fn close(&mut self) {
        if self.state == SessionState::Established {
            self.state = SessionState::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }

    /// Past its hard TTL
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// No traffic for longer than the idle window
    pub fn idle(&self, now: Instant, config: &ProtocolConfig) -> bool {
        now.duration_since(self.last_activity) >= config.idle_timeout
    }
}

/// Exclusive owner of this endpoint's live sessions
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    config: ProtocolConfig,
}

impl SessionManager {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Install a freshly established session, replacing any prior session
    /// with the peer
    pub fn install(&self, session: Session) {
        let peer = session.peer().to_string();
        debug!(peer = %peer, request_id = %session.request_id(), "session established");
        self.sessions.lock().insert(peer, session);
    }

    pub fn seal(&self, peer: &str, header: &Header, plaintext: &[u8]) -> Result<SecureMessage> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(peer)
            .ok_or_else(|| ProtocolError::NoSession(peer.to_string()))?;
        session.seal(header, plaintext)
    }

    /// Open an inbound frame, tearing the session down once its AEAD
    /// failure count reaches the configured threshold
    pub fn open(&self, peer: &str, header: &Header, message: &SecureMessage) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(peer)
            .ok_or_else(|| ProtocolError::NoSession(peer.to_string()))?;

        let result = session.open(header, message);
        if matches!(result, Err(ProtocolError::AeadAuthFail))
            && session.auth_failures() >= self.config.auth_fail_threshold
        {
            warn!(peer = %peer, failures = session.auth_failures(), "tearing down session after repeated AEAD failures");
            session.mark_failed();
            sessions.remove(peer);
        }
        result
    }

    /// Explicit tear-down; returns whether a session existed
    pub fn teardown(&self, peer: &str) -> bool {
        let mut sessions = self.sessions.lock();
        if let Some(mut session) = sessions.remove(peer) {
            session.close();
            session.mark_closed();
            true
        } else {
            false
        }
    }

    /// Drop sessions past their TTL or idle window; returns how many
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|peer, session| {
            let keep = !session.expired(now) && !session.idle(now, &self.config);
            if !keep {
                debug!(peer = %peer, "session expired");
                session.close();
                session.mark_closed();
            }
            keep
        });
        before - sessions.len()
    }

    pub fn state(&self, peer: &str) -> Option<SessionState> {
        self.sessions.lock().get(peer).map(|s| s.state())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
