use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use super::{read_lock, write_lock, Session};
use crate::error::{Result, SessionError};
use crate::kv::KvStore;
use crate::value::{decode_map, encode_map, SessionValue};

struct DurableState {
    values: HashMap<String, SessionValue>,
    dirty: bool,
    /// Bumped on every mutation and reload; lets `save` detect writes that
    /// raced with an in-flight flush.
    generation: u64,
}

/// Session mirrored in memory and written back lazily to a key-value store.
///
/// Mutations only mark the session dirty. Nothing reaches the store until
/// `save` is called, and `save` on a clean session makes no network call.
pub struct DurableSession {
    id: String,
    store_key: String,
    state: RwLock<DurableState>,
    expired: AtomicU64,
    store: Arc<dyn KvStore>,
    flush: tokio::sync::Mutex<()>,
}

impl DurableSession {
    pub fn new(id: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self::with_key_prefix(id, "", store)
    }

    pub fn with_key_prefix(id: impl Into<String>, prefix: &str, store: Arc<dyn KvStore>) -> Self {
        let id = id.into();
        Self {
            store_key: format!("{}{}", prefix, id),
            id,
            state: RwLock::new(DurableState {
                values: HashMap::with_capacity(8),
                dirty: true,
                generation: 0,
            }),
            expired: AtomicU64::new(0),
            store,
            flush: tokio::sync::Mutex::new(()),
        }
    }

    /// Key the session is stored under in the backend.
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    fn ttl(&self) -> Option<Duration> {
        match self.expired() {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[async_trait]
impl Session for DurableSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Result<SessionValue> {
        read_lock(&self.state)
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::KeyNotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: SessionValue) {
        let mut state = write_lock(&self.state);
        state.values.insert(key.to_string(), value);
        state.dirty = true;
        state.generation += 1;
    }

    fn del(&self, key: &str) {
        let mut state = write_lock(&self.state);
        state.values.remove(key);
        state.dirty = true;
        state.generation += 1;
    }

    fn set_expired(&self, ttl_secs: u64) {
        self.expired.store(ttl_secs, Ordering::Relaxed);
    }

    fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    fn is_modified(&self) -> bool {
        read_lock(&self.state).dirty
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn keys(&self) -> Vec<String> {
        read_lock(&self.state).values.keys().cloned().collect()
    }

    fn snapshot(&self) -> HashMap<String, SessionValue> {
        read_lock(&self.state).values.clone()
    }

    async fn save(&self) -> Result<()> {
        // One flush at a time per session; a second caller sees the first's result.
        let _flush = self.flush.lock().await;

        let (payload, generation) = {
            let state = read_lock(&self.state);
            if !state.dirty {
                return Ok(());
            }
            (encode_map(&state.values)?, state.generation)
        };

        let size = payload.len();
        self.store.set(&self.store_key, payload, self.ttl()).await?;

        let mut state = write_lock(&self.state);
        if state.generation == generation {
            state.dirty = false;
        }
        debug!("Saved session {} ({} bytes)", self.id, size);
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        let bytes = self
            .store
            .get(&self.store_key)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(self.id.clone()))?;
        let values = decode_map(&bytes)?;

        let mut state = write_lock(&self.state);
        state.values = values;
        state.dirty = false;
        state.generation += 1;
        debug!("Loaded session {} ({} keys)", self.id, state.values.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    fn durable(store: &Arc<InMemoryKvStore>) -> DurableSession {
        DurableSession::new("sid-1", store.clone() as Arc<dyn KvStore>)
    }

    #[test]
    fn test_new_session_is_dirty() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        assert!(session.is_modified());
        assert!(session.is_durable());
    }

    #[tokio::test]
    async fn test_save_clears_dirty_and_skips_when_clean() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        session.set("count", 5.into());

        session.save().await.unwrap();
        assert!(!session.is_modified());
        assert_eq!(store.writes(), 1);

        session.save().await.unwrap();
        assert_eq!(store.writes(), 1);

        session.del("count");
        assert!(session.is_modified());
        session.save().await.unwrap();
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_save_uses_expiration_as_ttl() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        session.set_expired(1800);
        session.save().await.unwrap();
        assert_eq!(
            store.ttl_of("sid-1"),
            Some(Some(Duration::from_secs(1800)))
        );
    }

    #[tokio::test]
    async fn test_zero_expiration_means_no_ttl() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        session.save().await.unwrap();
        assert_eq!(store.ttl_of("sid-1"), Some(None));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_dirty() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        session.set("a", 1.into());
        store.set_offline(true);

        let err = session.save().await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert!(session.is_modified());

        store.set_offline(false);
        session.save().await.unwrap();
        assert!(!session.is_modified());
    }

    #[tokio::test]
    async fn test_non_finite_float_rejected_before_write() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        session.set("isLogin", true.into());
        session.save().await.unwrap();
        assert_eq!(store.writes(), 1);

        session.set("ratio", SessionValue::Float(f64::NAN));
        let err = session.save().await.unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
        assert_eq!(store.writes(), 1);
        assert!(session.is_modified());

        // The stored record is still the last good one.
        let reader = durable(&store);
        reader.load().await.unwrap();
        assert_eq!(reader.get("isLogin").unwrap(), SessionValue::Bool(true));
        assert!(reader.get("ratio").is_err());

        session.set("ratio", SessionValue::Float(0.5));
        session.save().await.unwrap();
        reader.load().await.unwrap();
        assert_eq!(reader.get("ratio").unwrap().as_f64(), Some(0.5));
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let store = Arc::new(InMemoryKvStore::new());
        let session = durable(&store);
        let err = session.load().await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(ref id) if id == "sid-1"));
    }

    #[tokio::test]
    async fn test_load_undecodable_is_serialization_error() {
        let store = Arc::new(InMemoryKvStore::new());
        store.insert_raw("sid-1", b"\xff\xfe garbage".to_vec());
        let session = durable(&store);
        session.set("kept", true.into());

        let err = session.load().await.unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
        // Local values untouched on failure.
        assert_eq!(session.get("kept").unwrap(), SessionValue::Bool(true));
    }

    #[tokio::test]
    async fn test_load_replaces_values_wholesale() {
        let store = Arc::new(InMemoryKvStore::new());
        let writer = durable(&store);
        writer.set("count", 5.into());
        writer.save().await.unwrap();

        let reader = durable(&store);
        reader.set("local", "only".into());
        reader.load().await.unwrap();

        assert!(!reader.is_modified());
        assert_eq!(reader.get("count").unwrap().as_i64(), Some(5));
        assert!(reader.get("local").is_err());
    }

    #[tokio::test]
    async fn test_key_prefix_applied() {
        let store = Arc::new(InMemoryKvStore::new());
        let session =
            DurableSession::with_key_prefix("abc", "session:", store.clone() as Arc<dyn KvStore>);
        assert_eq!(session.store_key(), "session:abc");
        session.save().await.unwrap();
        assert!(store.contains("session:abc"));
        assert!(!store.contains("abc"));
    }
}
