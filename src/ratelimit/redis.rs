//! Redis-backed counter store.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config as PoolSettings, Pool, PoolConfig, Runtime};
use tracing::{debug, error, info};

use super::counter::CounterStore;
use crate::config::CounterStoreConfig;
use crate::error::{LimiterError, Result};

/// Counter store shared across processes through Redis.
///
/// `INCR` provides the atomic increment; `EXPIRE` is issued separately when
/// the increment returned 1. Every command is bounded by the configured
/// timeout and abandoned if it does not complete in time.
pub struct RedisCounterStore {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisCounterStore {
    /// Build a connection pool for `config.redis_url` and verify it with `PING`.
    pub async fn connect(config: &CounterStoreConfig) -> Result<Self> {
        info!(url = %config.redis_url, "Creating Redis connection pool");

        let store = Self::with_pool(config)?;
        store.health_check().await?;

        info!(
            max_connections = config.max_connections,
            "Redis connection pool ready"
        );
        Ok(store)
    }

    /// Build the pool without opening a connection. Connections are made lazily.
    fn with_pool(config: &CounterStoreConfig) -> Result<Self> {
        let mut settings = PoolSettings::from_url(config.redis_url.clone());
        settings.pool = Some(PoolConfig::new(config.max_connections));

        let pool = settings
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| LimiterError::Config(format!("Redis pool creation failed: {}", e)))?;

        Ok(Self {
            pool,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    /// Check that Redis answers `PING`.
    pub async fn health_check(&self) -> Result<()> {
        let response: String = self
            .bounded(async {
                let mut conn = self.pool.get().await?;
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok::<_, LimiterError>(pong)
            })
            .await?;

        if response != "PONG" {
            return Err(LimiterError::StoreUnavailable(format!(
                "unexpected PING response: {}",
                response
            )));
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| {
                LimiterError::StoreUnavailable(format!(
                    "Redis command timed out after {:?}",
                    self.command_timeout
                ))
            })?
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_get_count(&self, key: &str, window_secs: u64) -> Result<u64> {
        let count = self
            .bounded(async {
                let mut conn = self.pool.get().await?;
                let count: u64 = conn.incr(key, 1u64).await?;
                if count == 1 {
                    let ttl = i64::try_from(window_secs).unwrap_or(i64::MAX);
                    let _: bool = conn.expire(key, ttl).await?;
                }
                Ok::<_, LimiterError>(count)
            })
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "Redis increment failed");
                e
            })?;

        debug!(key = %key, count = count, "Incremented Redis counter");
        Ok(count)
    }
}
