//! QLink secure-messaging protocol
//!
//! Two-message authenticated handshake (KEMInit → KEMConfirm) over the
//! hybrid identity bundle, then a forward-secret chain-key ratchet feeding
//! an AES-256-GCM transport. Anti-replay is enforced with a timestamp
//! window, a bounded nonce cache and strictly increasing per-direction
//! sequence numbers.

pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod metrics;
pub mod ratchet;
pub mod replay;
pub mod session;

pub use config::ProtocolConfig;
pub use endpoint::{Endpoint, Event};
pub use envelope::{
    status, DidRequest, DidResponse, Header, KemConfirm, KemInit, Packet, Payload, SecureMessage,
    Status,
};
pub use error::{ProtocolError, Result};
pub use handshake::{Identity, PendingHandshake};
pub use metrics::{MetricsSink, NullMetrics, RecordingMetrics};
pub use ratchet::{ChainKey, MessageKey};
pub use replay::NonceCache;
pub use session::{Session, SessionManager, SessionState};
