//! Identity registry
//!
//! Authoritative in-memory DID→document map behind a reader-preferring lock.
//! Writes serialize; a successful register is visible to every subsequent
//! resolve in the process. When a storage backend is attached, documents and
//! their history write through to it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::did::Did;
use crate::document::{DidDocument, DocumentStatus};
use crate::error::{DidError, Result};
use crate::proof::Proof;
use crate::service::Service;
use crate::storage::{keys, Storage};
use crate::verification_method::VerificationMethod;

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub did: String,
    pub verification_method: Vec<VerificationMethod>,
    pub service: Vec<Service>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub did: String,
    /// Replaces the method set (and rebuilds relation lists) when present
    pub verification_method: Option<Vec<VerificationMethod>>,
    /// Replaces the service list when present
    pub service: Option<Vec<Service>>,
    pub proof: Option<Proof>,
}

#[derive(Default)]
struct RegistryInner {
    docs: HashMap<String, DidDocument>,
    history: HashMap<String, Vec<DidDocument>>,
}

/// Process-wide identity registry
pub struct Registry {
    inner: RwLock<RegistryInner>,
    storage: Option<Arc<dyn Storage>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            storage: None,
        }
    }

    /// Registry that writes documents and history through to `storage`
    pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            storage: Some(storage),
        }
    }

    /// Register a new DID. Fails with `InvalidDid` on a malformed or
    /// unsupported-method DID and `Conflict` when already present.
    pub fn register(&self, request: RegisterRequest) -> Result<DidDocument> {
        let did = Did::parse(&request.did)?;
        if !did.is_supported_method() {
            return Err(DidError::InvalidDid(format!(
                "unsupported method {:?}",
                did.method()
            )));
        }

        let doc = DidDocument::new(&did, request.verification_method, request.service);

        let mut inner = self.inner.write();
        if inner.docs.contains_key(did.as_str()) {
            return Err(DidError::Conflict(did.to_string()));
        }

        self.persist(&did, &doc, &[])?;
        inner.docs.insert(did.to_string(), doc.clone());
        drop(inner);

        info!(did = %did, "registered DID");
        Ok(doc)
    }

    /// Resolve a DID to its current document. A revoked DID resolves to
    /// `Revoked`, not to its terminal document.
    pub fn resolve(&self, did: &str) -> Result<DidDocument> {
        let inner = self.inner.read();
        let doc = inner
            .docs
            .get(did)
            .ok_or_else(|| DidError::NotFound(did.to_string()))?;
        if doc.status == DocumentStatus::Revoked {
            return Err(DidError::Revoked(did.to_string()));
        }
        Ok(doc.clone())
    }

    /// Apply a signed update: replace the method set and/or services,
    /// preserving `created` and pushing the outgoing version to history.
    pub fn update(&self, request: UpdateRequest) -> Result<DidDocument> {
        let mut inner = self.inner.write();
        let current = inner
            .docs
            .get(&request.did)
            .ok_or_else(|| DidError::NotFound(request.did.clone()))?;
        if current.status == DocumentStatus::Revoked {
            return Err(DidError::Revoked(request.did.clone()));
        }

        let previous = current.clone();
        let mut doc = current.clone();
        if let Some(methods) = request.verification_method {
            doc.verification_method = methods;
            doc.rebuild_relations();
        }
        if let Some(service) = request.service {
            doc.service = service;
        }
        doc.updated = chrono::Utc::now();
        doc.proof = request.proof;

        let did = Did::parse(&request.did)?;
        let history = self.push_history(&mut inner, &request.did, previous);
        self.persist(&did, &doc, &history)?;
        inner.docs.insert(request.did.clone(), doc.clone());
        drop(inner);

        debug!(did = %request.did, "updated DID document");
        Ok(doc)
    }

    /// Revoke a DID. Not idempotent: revoking a revoked DID fails with
    /// `Revoked`.
    pub fn revoke(&self, did: &str, proof: Proof) -> Result<()> {
        let mut inner = self.inner.write();
        let current = inner
            .docs
            .get(did)
            .ok_or_else(|| DidError::NotFound(did.to_string()))?;
        if current.status == DocumentStatus::Revoked {
            return Err(DidError::Revoked(did.to_string()));
        }

        let previous = current.clone();
        let mut doc = current.clone();
        doc.status = DocumentStatus::Revoked;
        doc.updated = chrono::Utc::now();
        doc.proof = Some(proof);

        let parsed = Did::parse(did)?;
        let history = self.push_history(&mut inner, did, previous);
        self.persist(&parsed, &doc, &history)?;
        inner.docs.insert(did.to_string(), doc);
        drop(inner);

        info!(did = %did, "revoked DID");
        Ok(())
    }

    /// Snapshot of all current documents, revoked included; order
    /// unspecified.
    pub fn list(&self) -> Vec<DidDocument> {
        self.inner.read().docs.values().cloned().collect()
    }

    /// Prior document versions, oldest first
    pub fn history(&self, did: &str) -> Vec<DidDocument> {
        self.inner
            .read()
            .history
            .get(did)
            .cloned()
            .unwrap_or_default()
    }

    fn push_history(
        &self,
        inner: &mut RegistryInner,
        did: &str,
        previous: DidDocument,
    ) -> Vec<DidDocument> {
        let list = inner.history.entry(did.to_string()).or_default();
        list.push(previous);
        list.clone()
    }

    fn persist(&self, did: &Did, doc: &DidDocument, history: &[DidDocument]) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        storage.put(&keys::did(did.as_str()), &doc.to_json()?)?;
        if !history.is_empty() {
            storage.put(&keys::history(did.as_str()), &serde_json::to_vec(history)?)?;
        }
        Ok(())
    }
}
