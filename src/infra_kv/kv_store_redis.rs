use crate::domain_port::*;
use crate::logger::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};
use std::future::Future;
use std::time::Duration;

const INCR_EX: &str = include_str!("incr_ex.lua");

pub struct RedisKvStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisKvStore {
    pub fn new(conn: ConnectionManager, op_timeout: Duration) -> Self {
        RedisKvStore { conn, op_timeout }
    }

    /// Open a managed connection and check it answers `PING` within `op_timeout`.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut conn = match tokio::time::timeout(op_timeout, client.get_connection_manager()).await
        {
            Ok(conn) => conn.map_err(|e| StoreError::Backend(e.to_string()))?,
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
        };

        let pong: String = match tokio::time::timeout(
            op_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        {
            Ok(pong) => pong.map_err(|e| StoreError::Backend(e.to_string()))?,
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
        };
        debug!(%pong, "redis connection established");

        Ok(Self::new(conn, op_timeout))
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait::async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = self.bounded(conn.set_ex(key, value, ttl_secs)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.bounded(conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(INCR_EX);
        let n: i64 = self
            .bounded(script.key(key).arg(ttl_secs).invoke_async(&mut conn))
            .await?;
        Ok(n)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = self.bounded(conn.zadd(key, member, score)).await?;
        Ok(())
    }

    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self.bounded(conn.zrembyscore(key, min, max)).await?;
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let n: u64 = self.bounded(conn.zcard(key)).await?;
        Ok(n)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let ttl_secs = i64::try_from(ttl_secs)
            .map_err(|_| StoreError::Backend(format!("invalid expire time: {ttl_secs}")))?;
        let mut conn = self.conn.clone();
        let set: bool = self.bounded(conn.expire(key, ttl_secs)).await?;
        Ok(set)
    }
}
