use crate::domain_model::{RelayRequest, RelayResponse};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("upstream timed out")]
    Timeout,
    #[error("invalid request for upstream: {0}")]
    InvalidRequest(String),
}

/// Transport to the business service.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, UpstreamError>;
}
