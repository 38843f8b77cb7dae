use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, redirect};
use std::time::Duration;

/// The business service, reached over plain HTTP(S).
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn try_new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Redirects belong to the client on the other side of the gateway.
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn to_header_map(headers: &HeaderList) -> Result<HeaderMap, UpstreamError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| UpstreamError::InvalidRequest(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_bytes(value)
            .map_err(|e| UpstreamError::InvalidRequest(format!("header {name}: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn from_reqwest(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else if e.is_builder() {
        UpstreamError::InvalidRequest(e.to_string())
    } else {
        UpstreamError::Unreachable(e.to_string())
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, UpstreamError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        let url = format!("{}{}", self.base_url, request.path_and_query());

        let response = self
            .client
            .request(method, &url)
            .headers(to_header_map(&request.headers)?)
            .body(request.body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        let body = response.bytes().await.map_err(from_reqwest)?;

        Ok(RelayResponse {
            status,
            headers,
            body,
        })
    }
}
