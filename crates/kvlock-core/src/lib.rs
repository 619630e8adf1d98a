//! kvlock core - cross-process mutual exclusion over a shared key-value store
//!
//! This crate provides:
//! - `LockStore`: the narrow store contract the lock depends on
//!   (atomic set-if-absent with expiry, scripted compare-then-act)
//! - `ScriptSet`: the three fixed server-side scripts (extend, delete, read-ttl)
//! - `Mutex`: a lock handle bound to one key and one fencing token
//! - `LockFactory`: constructs mutexes bound to a store connection
//! - `MemoryStore`: in-process store backend for embedded use and tests
//!
//! The lock is advisory: it coordinates cooperating clients that share a
//! store, it does not enforce exclusion at the storage engine. All lock
//! state lives in the store under the resource key; the token stored as the
//! key's value is the proof of ownership for every release, renewal, and
//! TTL read.

pub mod error;
pub mod mutex;
pub mod script;
pub mod store;

// Re-export commonly used types
pub use error::{LockError, StoreError};
pub use mutex::{
    DEFAULT_LEASE, DEFAULT_RETRY_INTERVAL, DEFAULT_SPIN_TIMEOUT, LockFactory, Mutex,
};
pub use script::{NOT_OWNED_SENTINEL, Script, ScriptKind, ScriptSet};
pub use store::{LockStore, MemoryStore};
