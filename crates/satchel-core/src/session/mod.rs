pub mod memory;
pub mod durable;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::value::SessionValue;

pub use durable::DurableSession;
pub use memory::MemorySession;

/// A per-identity bag of keyed values.
///
/// Accessors only take the session's own lock; `save` and `load` are the only
/// calls that may wait on a backend.
#[async_trait]
pub trait Session: Send + Sync {
    /// Opaque session id.
    fn id(&self) -> &str;

    /// Read a value. Fails with `KeyNotFound` when the key is absent.
    fn get(&self, key: &str) -> Result<SessionValue>;

    /// Insert or overwrite a value.
    fn set(&self, key: &str, value: SessionValue);

    /// Remove a value. Absent keys are ignored.
    fn del(&self, key: &str);

    /// Expiration (seconds) used the next time the session is persisted.
    fn set_expired(&self, ttl_secs: u64);

    fn expired(&self) -> u64;

    /// Whether there are mutations not yet flushed to the backend.
    fn is_modified(&self) -> bool;

    /// Whether the session is backed by a durable store and needs an explicit flush.
    fn is_durable(&self) -> bool;

    /// Keys currently held, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Copy of all values.
    fn snapshot(&self) -> HashMap<String, SessionValue>;

    /// Flush pending mutations to the backend.
    async fn save(&self) -> Result<()>;

    /// Replace local values with the backend's copy.
    async fn load(&self) -> Result<()>;
}

// Lock helpers. A poisoned lock only means a writer panicked mid-call; the map
// itself is still valid, so keep serving it.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
