#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Slots left in the current window after this request.
    pub remaining: u64,
    /// Admitted without consulting the store because it was unreachable.
    pub degraded: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("too many requests for policy {policy}")]
    RateExceeded { policy: String },
    #[error("no rate limit policy named {0}")]
    UnknownPolicy(String),
}

#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    async fn admit(&self, policy: &str, client_key: &str) -> Result<Admission, RateLimitError>;
}
