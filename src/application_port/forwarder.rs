use crate::domain_model::*;
use crate::domain_port::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<UpstreamError> for ForwardError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Unreachable(e) => ForwardError::UpstreamUnavailable(e),
            UpstreamError::Timeout => ForwardError::UpstreamUnavailable("timed out".into()),
            UpstreamError::InvalidRequest(e) => ForwardError::BadRequest(e),
        }
    }
}

#[async_trait::async_trait]
pub trait Forwarder: Send + Sync {
    /// Relay a request on behalf of a verified identity into the protected
    /// business domain.
    async fn forward(
        &self,
        identity: &Identity,
        request: RelayRequest,
    ) -> Result<RelayResponse, ForwardError>;

    /// Relay an anonymous request to a fixed downstream path.
    async fn relay(&self, request: RelayRequest) -> Result<RelayResponse, ForwardError>;
}
