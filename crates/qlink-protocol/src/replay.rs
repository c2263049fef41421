//! Anti-replay nonce cache
//!
//! Bounded map keyed by `(from_did, request_id)` holding the handshake
//! timestamp. Duplicates inside the acceptance window are rejected;
//! entries older than the window are pruned. An attached storage backend
//! records observed nonces under `nonce:<peer_did>:<request_id>`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use qlink_did::{keys, Storage};

/// Bounded replay filter for handshake frames
pub struct NonceCache {
    entries: Mutex<HashMap<(String, String), u64>>,
    max_entries: usize,
    storage: Option<Arc<dyn Storage>>,
}

impl NonceCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            storage: None,
        }
    }

    /// Cache that also records observed nonces through the storage
    /// collaborator
    pub fn with_storage(max_entries: usize, storage: Arc<dyn Storage>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            storage: Some(storage),
        }
    }

    /// Record a handshake sighting. Returns `false` when `(from_did,
    /// request_id)` was already seen inside the window.
    pub fn observe(
        &self,
        from_did: &str,
        request_id: &str,
        timestamp_ms: u64,
        window: Duration,
        now_ms: u64,
    ) -> bool {
        let key = (from_did.to_string(), request_id.to_string());
        let mut entries = self.entries.lock();

        let horizon = now_ms.saturating_sub(window.as_millis() as u64);
        if let Some(&seen) = entries.get(&key) {
            if seen >= horizon {
                return false;
            }
        }

        if entries.len() >= self.max_entries {
            entries.retain(|_, &mut ts| ts >= horizon);
        }
        if entries.len() >= self.max_entries {
            // Still full of in-window entries: drop the oldest sighting
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, &ts)| ts)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(key, timestamp_ms);
        drop(entries);

        if let Some(storage) = &self.storage {
            let key = keys::nonce(from_did, request_id);
            if let Err(e) = storage.put(&key, &timestamp_ms.to_be_bytes()) {
                warn!(error = %e, "failed to persist handshake nonce");
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
