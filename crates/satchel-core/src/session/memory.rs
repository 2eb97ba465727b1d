use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{read_lock, write_lock, Session};
use crate::error::{Result, SessionError};
use crate::value::SessionValue;

/// Session that lives only in process memory.
pub struct MemorySession {
    id: String,
    data: RwLock<HashMap<String, SessionValue>>,
    expired: AtomicU64,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: RwLock::new(HashMap::with_capacity(8)),
            expired: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Result<SessionValue> {
        read_lock(&self.data)
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::KeyNotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: SessionValue) {
        write_lock(&self.data).insert(key.to_string(), value);
    }

    fn del(&self, key: &str) {
        write_lock(&self.data).remove(key);
    }

    fn set_expired(&self, ttl_secs: u64) {
        self.expired.store(ttl_secs, Ordering::Relaxed);
    }

    fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    fn is_modified(&self) -> bool {
        false
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn keys(&self) -> Vec<String> {
        read_lock(&self.data).keys().cloned().collect()
    }

    fn snapshot(&self) -> HashMap<String, SessionValue> {
        read_lock(&self.data).clone()
    }

    async fn save(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        Ok(())
    }
}
