//! Per-request session lifecycle.
//!
//! Helpers for an HTTP layer: resolve the session for an incoming request
//! (reusing the presented id when it still resolves, otherwise starting a
//! fresh one) and release it when the request ends. Reading and writing the
//! identifying cookie stays with the caller.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::manager::SessionManager;
use crate::session::Session;

/// Session bound to one in-flight request.
pub struct RequestSession {
    pub session: Arc<dyn Session>,
    /// True when no usable id was presented and a new session was created.
    pub is_new: bool,
}

impl RequestSession {
    /// Id to hand back to the client.
    pub fn id(&self) -> &str {
        self.session.id()
    }
}

/// Resolve the session for a request.
///
/// Any lookup failure (unknown id, expired record, unreachable store) falls
/// back to a fresh session. `max_age_secs` is applied as the expiration.
pub async fn begin(
    manager: &dyn SessionManager,
    incoming_id: Option<&str>,
    max_age_secs: u64,
) -> RequestSession {
    let resolved = match incoming_id {
        Some(id) => match manager.get_session(id).await {
            Ok(session) => Some(session),
            Err(e) => {
                debug!("Session {} not reusable, starting fresh: {}", id, e);
                None
            }
        },
        None => None,
    };

    let (session, is_new) = match resolved {
        Some(session) => (session, false),
        None => (manager.create_session(), true),
    };
    session.set_expired(max_age_secs);
    RequestSession { session, is_new }
}

/// Release the session at the end of a request.
///
/// Durable sessions are flushed and evicted from the local registry; memory
/// sessions stay registered, since the registry is their only copy.
pub async fn finish(manager: &dyn SessionManager, request: RequestSession) -> Result<()> {
    if request.session.is_durable() {
        manager.clear(request.session.id()).await
    } else {
        Ok(())
    }
}
