//! QLink identity layer
//!
//! DID strings and documents anchored in an append-only registry, fronted by
//! a TTL cache and an optimistic resolver that serves the hot path from a
//! local snapshot while revalidating against the chain in the background.

pub mod cache;
pub mod chain;
pub mod did;
pub mod document;
pub mod error;
pub mod proof;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod storage;
pub mod verification_method;

pub use cache::{Cache, CacheConfig, CacheStats, Ttl};
pub use chain::{Chain, ChainError, SimulatedChain};
pub use did::Did;
pub use document::{DidDocument, DocumentStatus, DID_CONTEXT, JWS_2020_CONTEXT};
pub use error::{DidError, Result};
pub use proof::{Proof, ProofPurpose};
pub use registry::{RegisterRequest, Registry, UpdateRequest};
pub use resolver::{CachedResolver, MismatchCallback, OptimisticResolver, Resolve};
pub use service::Service;
pub use storage::{keys, Batch, MemoryStorage, Storage, StorageError, Transaction};
pub use verification_method::VerificationMethod;
