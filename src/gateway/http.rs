use std::any::Any;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::auth::{PROXY_AUTH_HEADER, authorize};
use super::providers::ProviderRegistry;
use super::proxy_backend::ProxyBackend;
use super::relay::{RelayMode, relay};
use super::transform::{InboundRequest, transform};
use crate::config::ProxyConfig;
use crate::error::{ConfigError, ProxyError, json_error};

#[derive(Clone, Debug)]
pub struct ProxyState {
    config: Arc<ProxyConfig>,
    providers: Arc<ProviderRegistry>,
    backend: ProxyBackend,
}

impl ProxyState {
    pub fn new(config: ProxyConfig, providers: ProviderRegistry) -> Result<Self, ConfigError> {
        let backend = ProxyBackend::new(&config.upstream)?;
        Ok(Self::with_backend(config, providers, backend))
    }

    pub fn with_backend(
        config: ProxyConfig,
        providers: ProviderRegistry,
        backend: ProxyBackend,
    ) -> Self {
        Self {
            config: Arc::new(config),
            providers: Arc::new(providers),
            backend,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Every route, the fallback included, sits behind the shared-secret check.
/// `/:provider` and `/:provider/` are listed separately because the
/// wildcard never matches an empty remainder.
pub fn router(state: ProxyState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/:provider", any(handle_proxy))
        .route("/:provider/", any(handle_proxy))
        .route("/:provider/*rest", any(handle_proxy))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_proxy_auth,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn not_found() -> ProxyError {
    ProxyError::NotFound
}

async fn require_proxy_auth(
    State(state): State<ProxyState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(PROXY_AUTH_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = authorize(state.config.shared_secret(), presented) {
        return err.into_response();
    }
    next.run(request).await
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("request handler panicked");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn handle_proxy(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ProxyError> {
    let (prefix, path) = split_provider_path(uri.path()).ok_or(ProxyError::NotFound)?;
    let provider = state
        .providers
        .resolve(prefix)
        .ok_or_else(|| ProxyError::UnknownProvider {
            prefix: prefix.to_string(),
        })?;

    let body = body.map_err(|rejection| body_error(rejection, state.config.max_body_bytes))?;
    let inbound = InboundRequest {
        method,
        path: path.to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };

    let outbound = transform(&inbound, provider, &state.config.credentials)?;
    tracing::info!(
        provider = provider.name,
        method = %outbound.method,
        url = %outbound.url,
        body_bytes = outbound.body.len(),
        "proxying request"
    );

    let upstream = state.backend.send(outbound).await?;
    let accept = inbound
        .headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok());
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let mode = RelayMode::select(accept, content_type);
    tracing::info!(
        provider = provider.name,
        status = upstream.status().as_u16(),
        mode = ?mode,
        "upstream responded"
    );

    relay(provider.name, mode, upstream).await
}

/// `/openai/v1/models` → `("openai", "v1/models")`; `/openai` and `/openai/`
/// both yield an empty remainder. The remainder keeps its percent-encoding.
fn split_provider_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let (prefix, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if prefix.is_empty() {
        return None;
    }
    Some((prefix, rest))
}

fn body_error(rejection: BytesRejection, limit: usize) -> ProxyError {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            ProxyError::PayloadTooLarge { limit }
        }
        other => ProxyError::RequestBody(other.body_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use axum::body::{Body, to_bytes};
    use axum::http::header::CONTENT_LENGTH;
    use tower::ServiceExt;

    fn state() -> ProxyState {
        let config = ProxyConfig::new(
            "secret",
            Credentials::default().with("OPENAI_API_KEY", "sk-test"),
        )
        .with_max_body_bytes(16);
        ProxyState::new(config, ProviderRegistry::builtin()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn provider_path_is_split_at_the_first_segment() {
        assert_eq!(
            split_provider_path("/openai/v1/models"),
            Some(("openai", "v1/models"))
        );
        assert_eq!(
            split_provider_path("/anthropic/v1/a%2Fb"),
            Some(("anthropic", "v1/a%2Fb"))
        );
        assert_eq!(split_provider_path("/openai/"), Some(("openai", "")));
        assert_eq!(split_provider_path("/openai"), Some(("openai", "")));
        assert_eq!(split_provider_path("//v1"), None);
        assert_eq!(split_provider_path("/"), None);
    }

    #[tokio::test]
    async fn health_requires_the_shared_secret() {
        let app = router(state());

        let denied = app
            .clone()
            .oneshot(
                axum::http::Request::get("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(denied).await,
            serde_json::json!({"error": "Unauthorized"})
        );

        let ok = app
            .oneshot(
                axum::http::Request::get("/health")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json_body(ok).await, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn empty_secret_never_opens_the_gate() {
        let config = ProxyConfig::new("", Credentials::default());
        let app = router(ProxyState::new(config, ProviderRegistry::builtin()).unwrap());
        let response = app
            .oneshot(
                axum::http::Request::get("/health")
                    .header(PROXY_AUTH_HEADER, "")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unmatched_paths_are_gated_then_not_found() {
        let app = router(state());

        let denied = app
            .clone()
            .oneshot(
                axum::http::Request::get("/nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let missing = app
            .oneshot(
                axum::http::Request::get("/nowhere")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let response = router(state())
            .oneshot(
                axum::http::Request::get("/mistral/v1/models")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "unknown provider: mistral"})
        );
    }

    #[tokio::test]
    async fn missing_credential_is_reported_without_calling_upstream() {
        let response = router(state())
            .oneshot(
                axum::http::Request::post("/deepseek/v1/chat/completions")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "DEEPSEEK_API_KEY not configured"})
        );
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let declared = router(state())
            .oneshot(
                axum::http::Request::post("/openai/v1/chat/completions")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .header(CONTENT_LENGTH, "17")
                    .body(Body::from("x".repeat(17)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(declared.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let streamed = router(state())
            .oneshot(
                axum::http::Request::post("/openai/v1/chat/completions")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .body(Body::from("y".repeat(64)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(streamed.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"0123456789")),
            Ok(Bytes::from_static(b"0123456789")),
        ]);
        let chunked = router(state())
            .oneshot(
                axum::http::Request::post("/openai/v1/chat/completions")
                    .header(PROXY_AUTH_HEADER, "secret")
                    .body(Body::from_stream(chunks))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(chunked.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            json_body(chunked).await,
            serde_json::json!({"error": "Request body exceeds 16 bytes"})
        );
    }
}
