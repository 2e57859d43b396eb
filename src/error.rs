use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Startup failures. The process refuses to serve when any of these occur.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be set")]
    MissingSecret { key: &'static str },
    #[error("invalid upstream override `{spec}`: {reason}")]
    InvalidUpstream { spec: String, reason: String },
    #[error("failed to read dotenv file {path}: {source}")]
    Dotenv {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upstream http client error: {0}")]
    HttpClient(String),
}

/// Per-request failures. Each one terminates the request with a JSON body of
/// the form `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("unknown provider: {prefix}")]
    UnknownProvider { prefix: String },
    #[error("{key} not configured")]
    MissingCredential { key: String },
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Failed to read request body: {0}")]
    RequestBody(String),
    #[error("Failed to create request: {0}")]
    RequestBuild(String),
    #[error("Failed to proxy request: {0}")]
    Upstream(String),
    #[error("Failed to read response: {0}")]
    ReadResponse(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound | Self::UnknownProvider { .. } => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestBody(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::MissingCredential { .. } | Self::RequestBuild(_) | Self::ReadResponse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: String,
}

pub(crate) fn json_error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "proxy request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "proxy request rejected");
        }
        json_error(status, self)
    }
}

/// Render an error together with its `source()` chain, e.g.
/// `error sending request for url (...): connection refused`.
pub(crate) fn display_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(next) = source {
        let text = next.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = next.source();
    }
    out
}
