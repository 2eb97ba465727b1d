use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{BackendKind, SessionManager};
use crate::error::{Result, SessionError};
use crate::session::{MemorySession, Session};

/// Manager for process-local sessions.
///
/// The registry is the only copy of each session: clearing an id destroys
/// its data for good.
pub struct MemorySessionManager {
    sessions: DashMap<String, Arc<MemorySession>>,
    default_ttl_secs: u64,
}

impl MemorySessionManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::with_capacity(1024),
            default_ttl_secs: 0,
        }
    }

    /// Expiration given to newly created sessions.
    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }
}

impl Default for MemorySessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionManager for MemorySessionManager {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get_session(&self, id: &str) -> Result<Arc<dyn Session>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone() as Arc<dyn Session>)
            .ok_or_else(|| SessionError::SessionNotFound(id.to_string()))
    }

    fn create_session(&self) -> Arc<dyn Session> {
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                let session = Arc::new(MemorySession::new(id));
                session.set_expired(self.default_ttl_secs);
                slot.insert(session.clone());
                debug!("Created memory session {}", session.id());
                return session;
            }
        }
    }

    async fn clear(&self, id: &str) -> Result<()> {
        if self.sessions.remove(id).is_some() {
            debug!("Destroyed memory session {}", id);
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
