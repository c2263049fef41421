//! Storage collaborator interface
//!
//! The registry and history store persist through this trait; real backends
//! live outside the core. The in-memory implementation exists for tests and
//! single-process deployments.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("transaction already closed")]
    TransactionClosed,
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persisted key layout
pub mod keys {
    /// `did:<did>` → serialized document
    pub fn did(did: &str) -> String {
        format!("did:{did}")
    }

    /// `history:<did>` → list of prior document snapshots
    pub fn history(did: &str) -> String {
        format!("history:{did}")
    }

    /// `nonce:<peer_did>:<request_id>` → handshake timestamp
    pub fn nonce(peer_did: &str, request_id: &str) -> String {
        format!("nonce:{peer_did}:{request_id}")
    }
}

/// A write batch applied atomically
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<Op>,
}

#[derive(Debug)]
enum Op {
    Put(String, Vec<u8>),
    Delete(String),
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.ops.push(Op::Put(key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(Op::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Buffered writes committed or rolled back as a unit
pub trait Transaction: Send {
    fn put(&mut self, key: &str, value: &[u8]) -> StorageResult<()>;
    fn delete(&mut self, key: &str) -> StorageResult<()>;
    /// Read-through: buffered writes shadow the backing store
    fn get(&mut self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    fn commit(self: Box<Self>) -> StorageResult<()>;
    fn rollback(self: Box<Self>);
}

/// Key/value collaborator used by the registry and history store
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;
    fn delete(&self, key: &str) -> StorageResult<()>;
    fn has(&self, key: &str) -> StorageResult<bool>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Apply a batch atomically
    fn apply(&self, batch: Batch) -> StorageResult<()>;

    /// Open a transaction
    fn transaction(&self) -> Box<dyn Transaction + '_>;
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.map.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.map.read().contains_key(key))
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .map
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, batch: Batch) -> StorageResult<()> {
        let mut map = self.map.write();
        for op in batch.ops {
            match op {
                Op::Put(k, v) => {
                    map.insert(k, v);
                }
                Op::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn transaction(&self) -> Box<dyn Transaction + '_> {
        Box::new(MemoryTransaction {
            storage: self,
            pending: Vec::new(),
        })
    }
}

struct MemoryTransaction<'a> {
    storage: &'a MemoryStorage,
    pending: Vec<Op>,
}

impl Transaction for MemoryTransaction<'_> {
    fn put(&mut self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.pending.push(Op::Put(key.to_string(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<()> {
        self.pending.push(Op::Delete(key.to_string()));
        Ok(())
    }

    fn get(&mut self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        // Later buffered writes win over earlier ones and over the store
        for op in self.pending.iter().rev() {
            match op {
                Op::Put(k, v) if k == key => return Ok(Some(v.clone())),
                Op::Delete(k) if k == key => return Ok(None),
                _ => {}
            }
        }
        self.storage.get(key)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut map = self.storage.map.write();
        for op in self.pending {
            match op {
                Op::Put(k, v) => {
                    map.insert(k, v);
                }
                Op::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        // Pending writes are dropped
    }
}
