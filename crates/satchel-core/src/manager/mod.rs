pub mod memory;
pub mod durable;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::{BackendOptions, SessionConfig};
use crate::error::{Result, SessionError};
use crate::session::Session;

pub use durable::DurableSessionManager;
pub use memory::MemorySessionManager;

/// Which storage strategy a manager uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            _ => Err(SessionError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Registry of live sessions for one backend.
///
/// The registry lock is only held while the id map itself changes. It is
/// never held across backend I/O or while a session's own lock is taken.
#[async_trait]
pub trait SessionManager: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Fetch a session by id.
    async fn get_session(&self, id: &str) -> Result<Arc<dyn Session>>;

    /// Create and register an empty session with a fresh id.
    fn create_session(&self) -> Arc<dyn Session>;

    /// Evict a session from the registry, flushing it first when dirty.
    async fn clear(&self, id: &str) -> Result<()>;

    /// Flush every dirty session held in the registry.
    async fn flush_all(&self) -> Result<()>;

    /// Whether `id` is currently registered locally.
    fn contains(&self, id: &str) -> bool;

    /// Number of locally registered sessions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create a session manager by provider name.
///
/// `options` are positional: `[]`, `[credential]` or
/// `[credential, namespace index]`. The memory provider ignores both
/// `address` and `options`.
pub async fn create_session_manager<S: AsRef<str>>(
    provider: &str,
    address: &str,
    options: &[S],
) -> Result<Arc<dyn SessionManager>> {
    match provider.parse::<BackendKind>()? {
        BackendKind::Memory => Ok(Arc::new(MemorySessionManager::new())),
        BackendKind::Redis => {
            let opts = BackendOptions::from_positional(options)?;
            connect_durable(provider, address, opts).await
        }
    }
}

/// Create a session manager from a loaded config.
pub async fn create_from_config(config: &SessionConfig) -> Result<Arc<dyn SessionManager>> {
    match config.provider.parse::<BackendKind>()? {
        BackendKind::Memory => Ok(Arc::new(
            MemorySessionManager::new().with_default_ttl(config.default_ttl_secs),
        )),
        BackendKind::Redis => {
            let opts = config.backend_options()?;
            connect_durable(&config.provider, &config.address, opts).await
        }
    }
}

#[cfg(feature = "redis-backend")]
async fn connect_durable(
    _provider: &str,
    address: &str,
    options: BackendOptions,
) -> Result<Arc<dyn SessionManager>> {
    let store = crate::kv::RedisKvStore::connect(address, &options).await?;
    let manager = DurableSessionManager::with_store(Arc::new(store), options).await?;
    info!("Session manager ready: redis at {}", address);
    Ok(Arc::new(manager))
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_durable(
    provider: &str,
    _address: &str,
    _options: BackendOptions,
) -> Result<Arc<dyn SessionManager>> {
    info!("Redis requested but satchel-core was built without redis-backend");
    Err(SessionError::UnsupportedBackend(provider.to_string()))
}
