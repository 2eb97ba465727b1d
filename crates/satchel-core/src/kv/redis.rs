use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use super::KvStore;
use crate::config::BackendOptions;
use crate::error::{ConfigError, Result, SessionError};

/// Redis-backed key-value store.
///
/// Holds one multiplexed connection; clones of it are handed to each call, so
/// a single store is shared by every session of a manager.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: MultiplexedConnection,
    io_timeout: Option<Duration>,
}

impl RedisKvStore {
    /// Connect to `address` (host:port or a redis:// URL) and probe it with PING.
    pub async fn connect(address: &str, options: &BackendOptions) -> Result<Self> {
        let url = if address.starts_with("redis://") || address.starts_with("rediss://") {
            address.to_string()
        } else {
            format!("redis://{}", address)
        };
        let mut conn_info = url
            .as_str()
            .into_connection_info()
            .map_err(|e| ConfigError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        if options.password.is_some() {
            conn_info.redis.password = options.password.clone();
        }
        conn_info.redis.db = options.db;

        let client = redis::Client::open(conn_info)?;
        let io_timeout = options.io_timeout;
        let conn = run_with_timeout(io_timeout, client.get_multiplexed_async_connection()).await?;

        let store = Self { conn, io_timeout };
        store.ping().await?;
        info!("Connected to redis at {} (db {})", address, options.db);
        Ok(store)
    }
}

async fn run_with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(SessionError::Connection(format!(
                "redis operation timed out after {:?}",
                limit
            ))),
        },
        None => Ok(fut.await?),
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = run_with_timeout(self.io_timeout, conn.get(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl.map(|d| d.as_secs()).filter(|secs| *secs > 0) {
            Some(secs) => {
                debug!("SETEX {} ({} bytes, {}s)", key, value.len(), secs);
                let _: () =
                    run_with_timeout(self.io_timeout, conn.set_ex(key, value, secs)).await?;
            }
            None => {
                debug!("SET {} ({} bytes)", key, value.len());
                let _: () = run_with_timeout(self.io_timeout, conn.set(key, value)).await?;
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String =
            run_with_timeout(self.io_timeout, redis::cmd("PING").query_async(&mut conn)).await?;
        debug!("redis ping: {}", pong);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_surfaces_as_connection_error() {
        let result = run_with_timeout(
            Some(Duration::from_millis(10)),
            std::future::pending::<redis::RedisResult<()>>(),
        )
        .await;
        assert!(matches!(result, Err(SessionError::Connection(ref m)) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_redis_error_maps_to_connection() {
        let failing = std::future::ready(redis::RedisResult::<()>::Err(
            (redis::ErrorKind::IoError, "connection refused").into(),
        ));
        let result = run_with_timeout(None, failing).await;
        assert!(matches!(result, Err(SessionError::Connection(_))));
    }

    #[tokio::test]
    async fn test_completed_operation_within_timeout() {
        let value = run_with_timeout(
            Some(Duration::from_secs(5)),
            std::future::ready(redis::RedisResult::Ok(7u8)),
        )
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_unparsable_address_is_config_error() {
        let result = RedisKvStore::connect("cache:not-a-port", &BackendOptions::default()).await;
        assert!(matches!(
            result,
            Err(SessionError::Config(ConfigError::InvalidAddress { ref address, .. }))
                if address == "cache:not-a-port"
        ));
    }
}
