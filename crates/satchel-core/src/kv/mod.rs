pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use memory::InMemoryKvStore;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisKvStore;

/// Trait for the networked key-value store behind durable sessions.
///
/// Implementations must be safe to share across every session of a manager.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw blob stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`. `ttl` of `None` means no expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;
}
