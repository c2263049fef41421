//! Protocol endpoint
//!
//! Front door for one identity: owns the session manager, the pending
//! handshake table and the replay filter, dispatches inbound packets to the
//! right flow and maps failures onto `Status` frames per the failure table
//! (or silent drops where a response would hand an attacker an oracle).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use qlink_did::{Did, DidDocument, Resolve, Storage};

use crate::config::ProtocolConfig;
use crate::envelope::{DidRequest, DidResponse, Header, Packet, Payload};
use crate::error::{ProtocolError, Result};
use crate::handshake::{self, Identity, PendingHandshake};
use crate::metrics::{MetricsSink, NullMetrics};
use crate::replay::NonceCache;
use crate::session::SessionManager;

/// Outcome of handling one inbound packet
#[derive(Debug)]
pub enum Event {
    /// Send this packet back to the peer
    Reply(Packet),
    /// A handshake we initiated completed
    Established { peer: Did, request_id: String },
    /// An authenticated application payload
    Message {
        peer: Did,
        sequence_number: u64,
        plaintext: Vec<u8>,
    },
    /// Answer to one of our DID requests
    Document {
        from: String,
        document: Option<Box<DidDocument>>,
        error: Option<String>,
    },
    /// A status frame from the peer
    StatusReceived {
        from: String,
        reply_to_id: String,
        code: String,
        message: String,
    },
    /// Frame dropped without a response
    Dropped { reason: ProtocolError },
}

pub struct Endpoint<R> {
    identity: Identity,
    resolver: Arc<R>,
    config: ProtocolConfig,
    sessions: SessionManager,
    pending: Mutex<HashMap<String, PendingHandshake>>,
    nonces: NonceCache,
    metrics: Arc<dyn MetricsSink>,
}

impl<R: Resolve> Endpoint<R> {
    pub fn new(identity: Identity, resolver: Arc<R>, config: ProtocolConfig) -> Self {
        Self::with_metrics(identity, resolver, config, Arc::new(NullMetrics))
    }

    pub fn with_metrics(
        identity: Identity,
        resolver: Arc<R>,
        config: ProtocolConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let nonces = NonceCache::new(config.nonce_cache_max);
        let sessions = SessionManager::new(config.clone());
        Self {
            identity,
            resolver,
            config,
            sessions,
            pending: Mutex::new(HashMap::new()),
            nonces,
            metrics,
        }
    }

    /// Endpoint whose replay filter also records observed nonces through
    /// the storage collaborator
    pub fn with_storage(
        identity: Identity,
        resolver: Arc<R>,
        config: ProtocolConfig,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let mut endpoint = Self::new(identity, resolver, config);
        endpoint.nonces = NonceCache::with_storage(endpoint.config.nonce_cache_max, storage);
        endpoint
    }

    pub fn did(&self) -> &Did {
        &self.identity.did
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Start a handshake with `peer_did`. Returns the KEMInit packet to
    /// transmit; completion arrives through `handle`.
    pub async fn connect(&self, peer_did: &str) -> Result<Packet> {
        let (packet, pending) =
            handshake::initiate(&self.identity, &*self.resolver, peer_did, &self.config).await?;
        self.pending
            .lock()
            .insert(pending.request_id().to_string(), pending);
        self.metrics.incr("handshake_initiated");
        Ok(packet)
    }

    /// Seal an application payload for an established peer
    pub fn send(&self, peer_did: &str, plaintext: &[u8]) -> Result<Packet> {
        let header = Header::new(self.identity.did.as_str(), peer_did);
        let message = self.sessions.seal(peer_did, &header, plaintext)?;
        self.metrics.incr("messages_sent");
        Ok(Packet::new(header, Payload::SecureMessage(message)))
    }

    /// Ask a peer's endpoint for a DID document
    pub fn request_document(&self, peer_did: &str, target_did: &str) -> Packet {
        Packet::new(
            Header::new(self.identity.did.as_str(), peer_did),
            Payload::DidRequest(DidRequest {
                target_did: target_did.to_string(),
            }),
        )
    }

    /// Dispatch one inbound packet. Total: every failure maps to a `Status`
    /// reply or a silent drop, never an error.
    pub async fn handle(&self, packet: Packet) -> Event {
        debug!(kind = packet.payload.kind(), from = %packet.header.from_did, "inbound packet");
        match &packet.payload {
            Payload::KemInit(init) => {
                let started = Instant::now();
                match handshake::respond(
                    &self.identity,
                    &*self.resolver,
                    &self.nonces,
                    &self.config,
                    &packet.header,
                    init,
                )
                .await
                {
                    Ok((reply, session)) => {
                        self.sessions.install(session);
                        self.metrics.incr("handshake_established");
                        self.metrics
                            .record_duration("handshake_respond", started.elapsed());
                        Event::Reply(reply)
                    }
                    Err(reason) => self.reject(&packet.header, reason),
                }
            }
            Payload::KemConfirm(confirm) => {
                let pending = self.pending.lock().remove(&packet.header.request_id);
                let Some(pending) = pending else {
                    return Event::Dropped {
                        reason: ProtocolError::InvalidState("no pending handshake"),
                    };
                };
                match handshake::complete(
                    &*self.resolver,
                    &pending,
                    &self.config,
                    &packet.header,
                    confirm,
                )
                .await
                {
                    Ok(session) => {
                        let peer = session.peer().clone();
                        let request_id = session.request_id().to_string();
                        self.sessions.install(session);
                        self.metrics.incr("handshake_established");
                        Event::Established { peer, request_id }
                    }
                    // The initiator observes a single final error; nothing
                    // is sent back and no partial session is retained.
                    Err(reason) => {
                        self.metrics.incr("handshake_failed");
                        Event::Dropped { reason }
                    }
                }
            }
            Payload::SecureMessage(message) => {
                match self
                    .sessions
                    .open(&packet.header.from_did, &packet.header, message)
                {
                    Ok(plaintext) => match Did::parse(&packet.header.from_did) {
                        Ok(peer) => {
                            self.metrics.incr("messages_received");
                            Event::Message {
                                peer,
                                sequence_number: message.sequence_number,
                                plaintext,
                            }
                        }
                        Err(e) => Event::Dropped { reason: e.into() },
                    },
                    Err(reason) => {
                        if matches!(reason, ProtocolError::AeadAuthFail) {
                            self.metrics.incr("auth_failures");
                        }
                        // Replay, gaps and forgeries are dropped without a
                        // response
                        Event::Dropped { reason }
                    }
                }
            }
            Payload::DidRequest(request) => {
                let response = match self.resolver.resolve(&request.target_did).await {
                    Ok(document) => DidResponse {
                        document: Some(document),
                        error: None,
                    },
                    Err(e) => DidResponse {
                        document: None,
                        error: Some(e.code().to_string()),
                    },
                };
                Event::Reply(Packet::new(
                    packet.header.reply_to(self.identity.did.as_str()),
                    Payload::DidResponse(response),
                ))
            }
            Payload::DidResponse(response) => Event::Document {
                from: packet.header.from_did.clone(),
                document: response.document.clone().map(Box::new),
                error: response.error.clone(),
            },
            Payload::Status(status) => Event::StatusReceived {
                from: packet.header.from_did.clone(),
                reply_to_id: status.reply_to_id.clone(),
                code: status.code.clone(),
                message: status.message.clone(),
            },
        }
    }

    /// Tear down the session with a peer
    pub fn teardown(&self, peer_did: &str) -> bool {
        let removed = self.sessions.teardown(peer_did);
        if removed {
            self.metrics.incr("sessions_torn_down");
        }
        removed
    }

    /// Drop expired sessions and timed-out pending handshakes; returns
    /// `(sessions, handshakes)` removed
    pub fn purge(&self) -> (usize, usize) {
        let sessions = self.sessions.purge_expired();

        let now = Instant::now();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, p| !p.expired(now));
        let handshakes = before - pending.len();
        drop(pending);

        if handshakes > 0 {
            self.metrics.incr_by("handshake_timeouts", handshakes as u64);
        }
        (sessions, handshakes)
    }

    fn reject(&self, header: &Header, reason: ProtocolError) -> Event {
        self.metrics.incr("handshake_rejected");
        match reason.status_code() {
            Some(code) => Event::Reply(Packet::status(
                header,
                self.identity.did.as_str(),
                code,
                reason.to_string(),
            )),
            None => Event::Dropped { reason },
        }
    }
}
