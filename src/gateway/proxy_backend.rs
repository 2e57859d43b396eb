use reqwest::Body as ReqwestBody;

use super::transform::OutboundRequest;
use crate::config::UpstreamSettings;
use crate::error::{ConfigError, ProxyError, display_chain};

/// Shared upstream transport. Cloning is cheap and every clone uses the same
/// connection pool; the pool is synchronized internally by `reqwest`.
#[derive(Clone, Debug)]
pub struct ProxyBackend {
    client: reqwest::Client,
}

impl ProxyBackend {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .build()
            .map_err(|err| ConfigError::HttpClient(display_chain(&err)))?;
        Ok(Self { client })
    }

    /// Execute exactly one attempt. On success the response body has not been
    /// read yet.
    pub async fn send(&self, request: OutboundRequest) -> Result<reqwest::Response, ProxyError> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = request;
        self.client
            .request(method, url)
            .headers(headers)
            .body(ReqwestBody::from(body))
            .send()
            .await
            .map_err(|err| ProxyError::Upstream(display_chain(&err)))
    }
}
