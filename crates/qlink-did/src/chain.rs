//! Chain collaborator interface
//!
//! The authoritative registry lives on a chain whose consensus is outside
//! this crate. Calls may block on network or consensus rounds, so every
//! caller issues them under a deadline.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::error::{DidError, Result};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("did not found on chain: {0}")]
    NotFound(String),

    #[error("chain unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative DID→document mapping
#[async_trait]
pub trait Chain: Send + Sync {
    async fn register_did_doc(&self, did: &str, doc: &[u8]) -> std::result::Result<(), ChainError>;

    async fn resolve_did_doc(&self, did: &str) -> std::result::Result<Vec<u8>, ChainError>;
}

/// Await a chain call under `deadline`; an elapsed deadline surfaces as
/// `Timeout` and the underlying future is detached (dropped, carrying no
/// secrets).
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ChainError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => {
            let value = result.map_err(|e| match e {
                ChainError::NotFound(did) => DidError::NotFound(did),
                other => DidError::Chain(other),
            })?;
            Ok(value)
        }
        Err(_) => Err(DidError::Timeout),
    }
}

/// In-memory chain with simulated lookup latency
#[derive(Default)]
pub struct SimulatedChain {
    docs: RwLock<HashMap<String, Vec<u8>>>,
    latency: Duration,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            latency,
        }
    }

    /// Overwrite a document directly, bypassing registration (test hook for
    /// divergence scenarios)
    pub fn put_raw(&self, did: &str, doc: Vec<u8>) {
        self.docs.write().insert(did.to_string(), doc);
    }
}

#[async_trait]
impl Chain for SimulatedChain {
    async fn register_did_doc(&self, did: &str, doc: &[u8]) -> std::result::Result<(), ChainError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.docs.write().insert(did.to_string(), doc.to_vec());
        Ok(())
    }

    async fn resolve_did_doc(&self, did: &str) -> std::result::Result<Vec<u8>, ChainError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.docs
            .read()
            .get(did)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(did.to_string()))
    }
}
