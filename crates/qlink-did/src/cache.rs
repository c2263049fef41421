//! Bounded TTL cache
//!
//! Expired entries are logically absent: removed lazily on access and
//! proactively by a background sweeper. On size pressure the entry with the
//! oldest creation time is evicted first. Readers share the lock; writers
//! (set, delete, evict, sweep) are exclusive.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Entry lifetime on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache's configured default
    Default,
    For(Duration),
    /// Insert already expired (test scaffolding)
    Expired,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Zero or negative disables the cache entirely: every set is a no-op
    pub max_size: i64,
    pub default_ttl: Duration,
    /// Sweeper period; zero disables the background sweeper
    pub cleanup_tick: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1024,
            default_ttl: Duration::from_secs(300),
            cleanup_tick: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

struct Shared<V> {
    config: CacheConfig,
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Shared<V> {
    /// Single exclusive pass dropping every expired entry
    fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            trace!(removed, "cache sweep removed expired entries");
        }
    }
}

/// Bounded, TTL-indexed map keyed by opaque string
pub struct Cache<V> {
    shared: Arc<Shared<V>>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    /// Create the cache and spawn its sweeper. Must be called within a
    /// tokio runtime unless `cleanup_tick` is zero.
    pub fn new(config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            config: config.clone(),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        });
        let (shutdown, mut rx) = watch::channel(false);

        let sweeper = if config.cleanup_tick.is_zero() {
            None
        } else {
            let shared = shared.clone();
            Some(tokio::spawn(async move {
                let mut tick = tokio::time::interval(shared.config.cleanup_tick);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = tick.tick() => shared.sweep(),
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }))
        };

        Self {
            shared,
            shutdown,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Fetch a live entry. Expired entries count as misses and are removed
    /// on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.shared.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    self.shared.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {} // expired; remove below under the write lock
                None => {
                    self.shared.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = self.shared.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= now {
                entries.remove(key);
            }
        }
        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert under `ttl`. No-op when the cache is disabled; evicts the
    /// oldest-created entry first when at capacity.
    pub fn set(&self, key: &str, value: V, ttl: Ttl) {
        if self.shared.config.max_size <= 0 {
            return;
        }
        let now = Instant::now();
        let expires_at = match ttl {
            Ttl::Default => now + self.shared.config.default_ttl,
            Ttl::For(d) => now + d,
            Ttl::Expired => now,
        };

        let mut entries = self.shared.entries.write();
        if !entries.contains_key(key) && entries.len() as i64 >= self.shared.config.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                trace!(key = %oldest, "evicting oldest cache entry");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: now,
                expires_at,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.shared.entries.write().remove(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            size: self.shared.entries.read().len(),
        }
    }

    /// Halt the sweeper deterministically: after `close` returns, no sweep
    /// will run again.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "cache sweeper did not shut down cleanly");
            }
        }
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        // Sweeper left behind by a missing close() must not outlive the map
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}
