use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use super::{KvBackend, ScanPage};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// Bounded pool of Redis connections.
///
/// Holds `size` connection managers. A semaphore with the same number of
/// permits gates checkout, so waiting callers suspend until a connection is
/// returned rather than opening new ones.
pub struct RedisPool {
    idle: Mutex<Vec<ConnectionManager>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl RedisPool {
    /// Open `config.pool_size` connections to `config.redis_url`.
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            StorageError::Unavailable {
                message: format!("Invalid Redis URL: {}", e),
            }
        })?;

        let timeout = Duration::from_millis(config.command_timeout_ms);
        let mut idle = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            let conn = tokio::time::timeout(timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| StorageError::Timeout {
                    timeout_ms: config.command_timeout_ms,
                })??;
            idle.push(conn);
        }

        info!(size = config.pool_size, "Redis connection pool ready");

        Ok(Self {
            idle: Mutex::new(idle),
            permits: Arc::new(Semaphore::new(config.pool_size)),
            size: config.pool_size,
        })
    }

    /// Check out a connection, waiting for one to be returned if all are in use.
    pub async fn get(&self) -> StorageResult<PooledConnection<'_>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| StorageError::PoolClosed)?;

        let conn = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .ok_or(StorageError::PoolClosed)?;

        Ok(PooledConnection {
            conn,
            pool: self,
            _permit: permit,
        })
    }

    /// Number of connections the pool was created with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuse further checkouts and drop idle connections.
    pub fn close(&self) {
        self.permits.close();
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn release(&self, conn: ConnectionManager) {
        if self.permits.is_closed() {
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(conn);
    }
}

/// A connection checked out of a [`RedisPool`]; returned on drop.
pub struct PooledConnection<'a> {
    conn: ConnectionManager,
    pool: &'a RedisPool,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection<'_> {
    type Target = ConnectionManager;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        // Managers are handles onto a shared multiplexed connection.
        self.pool.release(self.conn.clone());
    }
}

/// Redis-backed [`KvBackend`]. Every call is bounded by the command timeout,
/// including the wait for a pooled connection.
pub struct RedisBackend {
    pool: RedisPool,
    command_timeout_ms: u64,
}

impl RedisBackend {
    /// Connect a pool according to `config`
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let pool = RedisPool::connect(config).await?;
        Ok(Self {
            pool,
            command_timeout_ms: config.command_timeout_ms,
        })
    }

    /// The underlying pool
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    async fn run<T>(&self, cmd: Cmd) -> StorageResult<T>
    where
        T: FromRedisValue + Send,
    {
        let timeout = Duration::from_millis(self.command_timeout_ms);
        match tokio::time::timeout(timeout, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                timeout_ms: self.command_timeout_ms,
            }),
        }
    }

    async fn execute<T>(&self, cmd: Cmd) -> StorageResult<T>
    where
        T: FromRedisValue + Send,
    {
        let mut conn = self.pool.get().await?;
        let value: T = cmd.query_async(&mut *conn).await?;
        Ok(value)
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> StorageResult<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }
        let _added: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.run(cmd).await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StorageResult<ScanPage> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);
        let (next, keys): (u64, Vec<String>) = self.run(cmd).await?;

        debug!(pattern = %pattern, cursor = next, batch = keys.len(), "Scan page");
        Ok(ScanPage { cursor: next, keys })
    }

    async fn key_count(&self) -> StorageResult<u64> {
        self.run(redis::cmd("DBSIZE")).await
    }

    async fn flush(&self) -> StorageResult<()> {
        self.run(redis::cmd("FLUSHDB")).await
    }

    async fn close(&self) {
        self.pool.close();
    }
}
