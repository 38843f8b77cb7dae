use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("store error: {0}")]
    Backend(String),
}

/// The subset of a networked key-value store the gateway relies on.
///
/// Every operation is atomic on the server side. Implementations must bound
/// each call and report [`StoreError::Timeout`] instead of hanging.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Returns whether a key was removed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Increment an integer counter. The expiry is attached when the counter
    /// is created and left alone by later increments.
    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Remove sorted-set members whose score lies in `[min, max]`.
    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError>;

    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;
}
