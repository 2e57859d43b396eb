//! Builds the outbound provider request from the inbound client request.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;

use super::auth::PROXY_AUTH_HEADER;
use super::providers::{ApiKeyHeaderAuth, AuthStrategy, ProviderConfig};
use crate::config::Credentials;
use crate::error::ProxyError;

/// Inbound headers that are never copied upstream. Matching is
/// case-insensitive because `HeaderName` is always lowercase.
pub const EXCLUDED_HEADERS: [&str; 6] = [
    "host",
    "authorization",
    PROXY_AUTH_HEADER,
    "x-api-key",
    "content-length",
    "connection",
];

#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: Method,
    /// Path after `/{provider}/`, still percent-encoded.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: reqwest::Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub fn is_excluded_header(name: &HeaderName) -> bool {
    EXCLUDED_HEADERS.contains(&name.as_str())
}

pub fn target_url(
    base_url: &str,
    path: &str,
    query: Option<&str>,
) -> Result<reqwest::Url, ProxyError> {
    let mut url = format!("{base_url}/{path}");
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    reqwest::Url::parse(&url).map_err(|err| ProxyError::RequestBuild(format!("{url}: {err}")))
}

pub fn transform(
    inbound: &InboundRequest,
    provider: &ProviderConfig,
    credentials: &Credentials,
) -> Result<OutboundRequest, ProxyError> {
    let credential =
        credentials
            .get(provider.credential_key)
            .ok_or_else(|| ProxyError::MissingCredential {
                key: provider.credential_key.to_string(),
            })?;

    let url = target_url(&provider.base_url, &inbound.path, inbound.query.as_deref())?;

    let mut headers = HeaderMap::with_capacity(inbound.headers.len() + 3);
    for (name, value) in inbound.headers.iter() {
        if is_excluded_header(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match provider.auth {
        AuthStrategy::Bearer => {
            let value = credential_value(&format!("Bearer {credential}"), provider)?;
            headers.insert(AUTHORIZATION, value);
        }
        AuthStrategy::ApiKeyHeader(auth) => {
            apply_api_key_header(&mut headers, &inbound.headers, auth, credential, provider)?;
        }
    }

    Ok(OutboundRequest {
        method: inbound.method.clone(),
        url,
        headers,
        body: inbound.body.clone(),
    })
}

fn apply_api_key_header(
    headers: &mut HeaderMap,
    inbound: &HeaderMap,
    auth: ApiKeyHeaderAuth,
    credential: &str,
    provider: &ProviderConfig,
) -> Result<(), ProxyError> {
    headers.insert(auth.key_header, credential_value(credential, provider)?);
    headers.insert(auth.version_header, HeaderValue::from_static(auth.version));

    // The generic copy may have forwarded several values; only the first one
    // supplied by the client is kept.
    headers.remove(auth.passthrough_header);
    if let Some(value) = inbound
        .get(auth.passthrough_header)
        .filter(|value| !value.is_empty())
    {
        headers.insert(auth.passthrough_header, value.clone());
    }
    Ok(())
}

fn credential_value(raw: &str, provider: &ProviderConfig) -> Result<HeaderValue, ProxyError> {
    let mut value = HeaderValue::from_str(raw).map_err(|_| {
        ProxyError::RequestBuild(format!(
            "{} contains characters not allowed in a header",
            provider.credential_key
        ))
    })?;
    value.set_sensitive(true);
    Ok(value)
}
