use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::KvStore;
use crate::error::{Result, SessionError};

/// Process-local key-value store with call counters.
///
/// Stands in for the network store in tests and the CLI demo. Entries never
/// expire; the TTL passed to `set` is recorded so callers can assert on it.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Option<Duration>)>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `set` calls accepted.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// TTL recorded with the last write of `key`.
    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        self.lock().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Put raw bytes directly, bypassing counters.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        self.lock().insert(key.to_string(), (value, None));
    }

    /// Simulate an unreachable store: every call fails with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SessionError::Connection("store offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, Option<Duration>)>> {
        // A poisoned map is still structurally valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(key.to_string(), (value, ttl));
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_online()
    }
}
