use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{BackendKind, SessionManager};
use crate::config::BackendOptions;
use crate::error::Result;
use crate::kv::KvStore;
use crate::session::{DurableSession, Session};

/// Manager for sessions written back to a key-value store.
///
/// The registry here is only a local mirror. Lookups always reload from the
/// store, and clearing an id flushes pending changes before dropping the
/// mirror; the stored copy outlives the eviction.
pub struct DurableSessionManager {
    sessions: DashMap<String, Arc<DurableSession>>,
    store: Arc<dyn KvStore>,
    key_prefix: String,
    default_ttl_secs: u64,
}

impl DurableSessionManager {
    /// Build a manager over `store`, probing it first.
    ///
    /// A failed probe is returned as a connection error and no manager is built.
    pub async fn with_store(store: Arc<dyn KvStore>, options: BackendOptions) -> Result<Self> {
        store.ping().await?;
        Ok(Self {
            sessions: DashMap::with_capacity(1024),
            store,
            key_prefix: options.key_prefix,
            default_ttl_secs: options.default_ttl_secs,
        })
    }

    fn new_shell(&self, id: String) -> Arc<DurableSession> {
        let session = DurableSession::with_key_prefix(id, &self.key_prefix, self.store.clone());
        session.set_expired(self.default_ttl_secs);
        Arc::new(session)
    }
}

#[async_trait]
impl SessionManager for DurableSessionManager {
    fn backend(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get_session(&self, id: &str) -> Result<Arc<dyn Session>> {
        // Always reload: a mirror from an earlier request may be stale.
        let session = self.new_shell(id.to_string());
        session.load().await?;
        self.sessions.insert(id.to_string(), session.clone());
        debug!("Registered durable session {}", id);
        Ok(session as Arc<dyn Session>)
    }

    fn create_session(&self) -> Arc<dyn Session> {
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                let session = self.new_shell(id);
                slot.insert(session.clone());
                debug!("Created durable session {}", session.id());
                return session;
            }
        }
    }

    async fn clear(&self, id: &str) -> Result<()> {
        let registered = self.sessions.get(id).map(|entry| entry.value().clone());
        let session = match registered {
            Some(session) => session,
            None => {
                debug!("Clear on unregistered session {}", id);
                return Ok(());
            }
        };

        let flushed = if session.is_modified() {
            session.save().await
        } else {
            Ok(())
        };

        // Evict even when the flush failed, but only the handle flushed above;
        // a lookup may have registered a newer one meanwhile.
        self.sessions
            .remove_if(id, |_, registered| Arc::ptr_eq(registered, &session));
        if let Err(e) = &flushed {
            warn!("Evicted session {} without flushing: {}", id, e);
        } else {
            debug!("Evicted session {}", id);
        }
        flushed
    }

    async fn flush_all(&self) -> Result<()> {
        // Copy the handles out first so no session lock is taken under the registry lock.
        let registered: Vec<Arc<DurableSession>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let dirty: Vec<Arc<DurableSession>> = registered
            .into_iter()
            .filter(|session| session.is_modified())
            .collect();
        debug!("Flushing {} dirty sessions", dirty.len());

        let results =
            futures::future::join_all(dirty.iter().map(|session| session.save())).await;

        let mut first_err = None;
        for (session, result) in dirty.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to flush session {}: {}", session.id(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
