use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";

/// Never relayed in either direction. `host` and `content-length` are
/// recomputed by the outgoing transport.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub struct IdentityForwarder {
    upstream: Arc<dyn Upstream>,
    gateway_prefix: String,
    upstream_prefix: String,
}

impl IdentityForwarder {
    /// Requests under `gateway_prefix` land under `upstream_prefix` downstream,
    /// e.g. `/api/business/orders` -> `/api/orders`.
    pub fn new(
        upstream: Arc<dyn Upstream>,
        gateway_prefix: impl Into<String>,
        upstream_prefix: impl Into<String>,
    ) -> Self {
        Self {
            upstream,
            gateway_prefix: gateway_prefix.into(),
            upstream_prefix: upstream_prefix.into(),
        }
    }

    fn rewrite_path(&self, path: &str) -> Result<String, ForwardError> {
        let rest = path
            .strip_prefix(self.gateway_prefix.as_str())
            .ok_or_else(|| ForwardError::BadRequest(format!("{path} is not a business route")))?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(ForwardError::BadRequest(format!(
                "{path} is not a business route"
            )));
        }
        Ok(format!("{}{}", self.upstream_prefix, rest))
    }

    fn strip_request_headers(request: &mut RelayRequest) {
        request.headers.retain(|(name, _)| {
            !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
                && !name.eq_ignore_ascii_case("authorization")
        });
    }

    fn strip_response_headers(response: &mut RelayResponse) {
        response
            .headers
            .retain(|(name, _)| !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)));
    }

    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, ForwardError> {
        let method = request.method.clone();
        let target = request.path_and_query();
        match self.upstream.send(request).await {
            Ok(mut response) => {
                debug!(%method, %target, status = response.status, "relayed");
                Self::strip_response_headers(&mut response);
                Ok(response)
            }
            Err(e) => {
                error!(%method, %target, "relay failed: {}", e);
                Err(e.into())
            }
        }
    }
}

#[async_trait::async_trait]
impl Forwarder for IdentityForwarder {
    async fn forward(
        &self,
        identity: &Identity,
        mut request: RelayRequest,
    ) -> Result<RelayResponse, ForwardError> {
        request.path = self.rewrite_path(&request.path)?;
        Self::strip_request_headers(&mut request);
        // Overwrites anything the client tried to claim for itself.
        request.set_header(USER_ID_HEADER, identity.subject_id.to_string());
        request.set_header(USERNAME_HEADER, identity.subject_name.as_bytes());
        self.send(request).await
    }

    async fn relay(&self, mut request: RelayRequest) -> Result<RelayResponse, ForwardError> {
        Self::strip_request_headers(&mut request);
        request.headers.retain(|(name, _)| {
            !name.eq_ignore_ascii_case(USER_ID_HEADER) && !name.eq_ignore_ascii_case(USERNAME_HEADER)
        });
        self.send(request).await
    }
}
