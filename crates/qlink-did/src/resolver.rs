//! Cached and optimistic DID resolution
//!
//! The cached resolver fronts any resolver with a per-key TTL. The
//! optimistic resolver fronts the chain with a local snapshot: cache hits
//! return immediately with zero round-trips while a background task
//! revalidates against the chain, replacing the snapshot and firing the
//! mismatch callback when the authoritative bytes diverge.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheConfig, CacheStats, Ttl};
use crate::chain::{with_deadline, Chain};
use crate::document::DidDocument;
use crate::error::Result;
use crate::registry::Registry;

/// Anything that turns a DID into its current document
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<DidDocument>;
}

#[async_trait]
impl Resolve for Registry {
    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        Registry::resolve(self, did)
    }
}

/// Read-through TTL cache over a resolver. Only successful (therefore
/// non-revoked) resolutions are cached; errors always hit the backend.
pub struct CachedResolver<R> {
    inner: Arc<R>,
    cache: Cache<DidDocument>,
}

impl<R: Resolve> CachedResolver<R> {
    pub fn new(inner: Arc<R>, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: Cache::new(config),
        }
    }

    pub async fn resolve(&self, did: &str) -> Result<DidDocument> {
        if let Some(doc) = self.cache.get(did) {
            return Ok(doc);
        }
        let doc = self.inner.resolve(did).await?;
        self.cache.set(did, doc.clone(), Ttl::Default);
        Ok(doc)
    }

    /// Drop a cached document (e.g. after a local revoke)
    pub fn invalidate(&self, did: &str) {
        self.cache.delete(did);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn close(&self) {
        self.cache.close().await;
    }
}

#[async_trait]
impl<R: Resolve> Resolve for CachedResolver<R> {
    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        CachedResolver::resolve(self, did).await
    }
}

/// Invoked as `(did, cached_bytes, fresh_bytes)` when revalidation observes
/// divergence
pub type MismatchCallback = Arc<dyn Fn(&str, &[u8], &[u8]) + Send + Sync>;

/// Serve-stale-revalidate resolver over the chain
pub struct OptimisticResolver {
    chain: Arc<dyn Chain>,
    snapshot: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    on_mismatch: MismatchCallback,
    chain_deadline: Duration,
    tasks: Arc<Mutex<JoinSet<()>>>,
    closed: Arc<AtomicBool>,
}

impl OptimisticResolver {
    pub fn new(chain: Arc<dyn Chain>, on_mismatch: MismatchCallback) -> Self {
        Self::with_deadline(chain, on_mismatch, Duration::from_secs(10))
    }

    pub fn with_deadline(
        chain: Arc<dyn Chain>,
        on_mismatch: MismatchCallback,
        chain_deadline: Duration,
    ) -> Self {
        Self {
            chain,
            snapshot: Arc::new(RwLock::new(HashMap::new())),
            on_mismatch,
            chain_deadline,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fast path: a snapshotted document returns immediately and is
    /// revalidated in the background. Cold miss: synchronous authoritative
    /// fetch under the chain deadline.
    pub async fn resolve(&self, did: &str) -> Result<DidDocument> {
        let cached = self.snapshot.read().get(did).cloned();
        if let Some(bytes) = cached {
            let doc = DidDocument::from_json(&bytes)?;
            self.spawn_revalidation(did.to_string(), bytes);
            return Ok(doc);
        }

        let fresh = with_deadline(self.chain_deadline, self.chain.resolve_did_doc(did)).await?;
        let doc = DidDocument::from_json(&fresh)?;
        self.snapshot.write().insert(did.to_string(), fresh);
        Ok(doc)
    }

    fn spawn_revalidation(&self, did: String, cached: Vec<u8>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let chain = self.chain.clone();
        let snapshot = self.snapshot.clone();
        let on_mismatch = self.on_mismatch.clone();
        let deadline = self.chain_deadline;

        self.tasks.lock().spawn(async move {
            match with_deadline(deadline, chain.resolve_did_doc(&did)).await {
                Ok(fresh) if fresh != cached => {
                    {
                        let mut snapshot = snapshot.write();
                        snapshot.insert(did.clone(), fresh.clone());
                    }
                    debug!(did = %did, "optimistic cache diverged from chain, replaced");
                    (*on_mismatch)(&did, &cached, &fresh);
                }
                Ok(_) => {}
                // Background failures are recorded, never propagated
                Err(e) => warn!(did = %did, error = %e, "optimistic revalidation failed"),
            }
        });
    }

    /// Number of snapshotted documents
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Stop accepting revalidation work and join every in-flight task
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while tasks.join_next().await.is_some() {}
    }
}

#[async_trait]
impl Resolve for OptimisticResolver {
    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        OptimisticResolver::resolve(self, did).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SimulatedChain;
    use crate::did::Did;
    use crate::error::DidError;
    use crate::registry::RegisterRequest;
    use crate::service::Service;
    use crate::verification_method::VerificationMethod;
    use qlink_pqc::HybridKeyPair;

    fn registered(registry: &Registry) -> DidDocument {
        let pair = HybridKeyPair::generate().unwrap();
        let did = Did::parse(&pair.derive_did()).unwrap();
        registry
            .register(RegisterRequest {
                did: did.to_string(),
                verification_method: vec![VerificationMethod::new_jwk(
                    &did,
                    "keys-1",
                    pair.to_record(),
                )],
                service: vec![],
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_cached_resolver_reads_through_once() {
        let registry = Arc::new(Registry::new());
        let doc = registered(&registry);
        let resolver = CachedResolver::new(
            registry.clone(),
            CacheConfig {
                cleanup_tick: Duration::ZERO,
                ..CacheConfig::default()
            },
        );

        assert_eq!(resolver.resolve(&doc.id).await.unwrap(), doc);
        assert_eq!(resolver.resolve(&doc.id).await.unwrap(), doc);

        let stats = resolver.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        resolver.close().await;
    }

    #[tokio::test]
    async fn test_cached_resolver_does_not_cache_errors() {
        let registry = Arc::new(Registry::new());
        let resolver = CachedResolver::new(
            registry.clone(),
            CacheConfig {
                cleanup_tick: Duration::ZERO,
                ..CacheConfig::default()
            },
        );

        for _ in 0..2 {
            assert!(matches!(
                resolver.resolve("did:qlink:absent").await.unwrap_err(),
                DidError::NotFound(_)
            ));
        }
        assert_eq!(resolver.cache_stats().size, 0);
        resolver.close().await;
    }

    fn doc_bytes(registry: &Registry) -> (String, Vec<u8>) {
        let doc = registered(registry);
        (doc.id.clone(), doc.to_json().unwrap())
    }

    #[tokio::test]
    async fn test_optimistic_cold_miss_populates() {
        let registry = Registry::new();
        let (did, bytes) = doc_bytes(&registry);
        let chain = Arc::new(SimulatedChain::new());
        chain.put_raw(&did, bytes);

        let resolver = OptimisticResolver::new(chain, Arc::new(|_, _, _| {}));
        let doc = resolver.resolve(&did).await.unwrap();
        assert_eq!(doc.id, did);
        assert_eq!(resolver.snapshot_len(), 1);
        resolver.close().await;
    }

    #[tokio::test]
    async fn test_optimistic_serves_stale_then_converges() {
        let registry = Registry::new();
        let (did, old_bytes) = doc_bytes(&registry);
        let chain = Arc::new(SimulatedChain::new());
        chain.put_raw(&did, old_bytes.clone());

        let observed: Arc<Mutex<Vec<(String, Vec<u8>, Vec<u8>)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        let resolver = OptimisticResolver::new(
            chain.clone(),
            Arc::new(move |did, cached, fresh| {
                sink.lock()
                    .push((did.to_string(), cached.to_vec(), fresh.to_vec()));
            }),
        );

        // Warm the snapshot, then rotate the chain copy behind its back
        resolver.resolve(&did).await.unwrap();
        let mut updated = DidDocument::from_json(&old_bytes).unwrap();
        updated.service.push(Service::new(
            format!("{did}#inbox"),
            "MessagingService",
            "https://example.com/inbox",
        ));
        let new_bytes = updated.to_json().unwrap();
        chain.put_raw(&did, new_bytes.clone());

        // Stale copy served immediately
        let doc = resolver.resolve(&did).await.unwrap();
        assert_eq!(doc.to_json().unwrap(), old_bytes);

        // One revalidation round-trip later the snapshot has converged
        resolver.close().await;
        {
            let events = observed.lock();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].0, did);
            assert_eq!(events[0].1, old_bytes);
            assert_eq!(events[0].2, new_bytes);
        }

        // Next read serves the fresh copy (closed resolver spawns no more
        // revalidations, the fast path still works)
        let doc = resolver.resolve(&did).await.unwrap();
        assert_eq!(doc.to_json().unwrap(), new_bytes);
    }

    #[tokio::test]
    async fn test_optimistic_matching_bytes_fire_no_callback() {
        let registry = Registry::new();
        let (did, bytes) = doc_bytes(&registry);
        let chain = Arc::new(SimulatedChain::new());
        chain.put_raw(&did, bytes);

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let resolver = OptimisticResolver::new(
            chain,
            Arc::new(move |_, _, _| flag.store(true, Ordering::SeqCst)),
        );

        resolver.resolve(&did).await.unwrap();
        resolver.resolve(&did).await.unwrap();
        resolver.close().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
