//! Upstream response → client response.
//!
//! Event streams are relayed one line per body frame so every event reaches
//! the client as soon as the upstream produced it; everything else is read
//! fully and sent in one piece.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;

use crate::error::{ProxyError, display_chain};

pub const EVENT_STREAM: &str = "text/event-stream";

const STREAM_READ_BUFFER_BYTES: usize = 64 * 1024;
const MAX_LOGGED_ERROR_BODY_BYTES: usize = 64 * 1024;
const HOP_BY_HOP_RESPONSE_HEADERS: [&str; 3] = ["connection", "keep-alive", "transfer-encoding"];

pub type UpstreamBodyStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayMode {
    Buffered,
    Streaming,
}

impl RelayMode {
    /// Streaming only when the client asked for an event stream and the
    /// upstream actually answered with one.
    pub fn select(accept: Option<&str>, upstream_content_type: Option<&str>) -> Self {
        let requested = accept.is_some_and(|value| value.contains(EVENT_STREAM));
        let produced = upstream_content_type.is_some_and(|value| value.contains(EVENT_STREAM));
        if requested && produced {
            Self::Streaming
        } else {
            Self::Buffered
        }
    }
}

/// Copy upstream headers, keeping repeated values. Hop-by-hop headers belong
/// to the upstream connection and are dropped.
pub fn copy_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        if HOP_BY_HOP_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

pub async fn relay(
    provider: &str,
    mode: RelayMode,
    upstream: reqwest::Response,
) -> Result<Response, ProxyError> {
    let status = upstream.status();
    let mut headers = copy_response_headers(upstream.headers());

    match mode {
        RelayMode::Buffered => {
            let body = upstream
                .bytes()
                .await
                .map_err(|err| ProxyError::ReadResponse(display_chain(&err)))?;
            if status.is_client_error() || status.is_server_error() {
                tracing::warn!(
                    provider,
                    status = status.as_u16(),
                    body = %truncate_for_log(&body, MAX_LOGGED_ERROR_BODY_BYTES),
                    "upstream returned an error response"
                );
            }
            Ok(build_response(status, headers, Body::from(body)))
        }
        RelayMode::Streaming => {
            apply_streaming_headers(&mut headers);
            let upstream_stream: UpstreamBodyStream = upstream
                .bytes_stream()
                .map(|chunk| chunk.map_err(std::io::Error::other))
                .boxed();
            let lines = relay_lines(provider.to_string(), upstream_stream);
            Ok(build_response(status, headers, Body::from_stream(lines)))
        }
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn apply_streaming_headers(headers: &mut HeaderMap) {
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
}

struct LineRelay {
    reader: BufReader<StreamReader<UpstreamBodyStream, Bytes>>,
    provider: String,
    bytes: u64,
    lines: u64,
    finished: bool,
}

impl Drop for LineRelay {
    fn drop(&mut self) {
        // Dropped by the server before end-of-input: the client went away.
        if !self.finished {
            tracing::warn!(
                provider = %self.provider,
                bytes = self.bytes,
                lines = self.lines,
                "client disconnected during stream; closing upstream"
            );
        }
    }
}

/// Re-chunk an upstream body into newline-terminated lines, newline
/// included. A trailing line without newline is emitted as-is at
/// end-of-input. A read error is yielded once and ends the stream.
pub fn relay_lines(
    provider: String,
    upstream: UpstreamBodyStream,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let state = LineRelay {
        reader: BufReader::with_capacity(STREAM_READ_BUFFER_BYTES, StreamReader::new(upstream)),
        provider,
        bytes: 0,
        lines: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let mut line = Vec::new();
        match state.reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                state.finished = true;
                tracing::info!(
                    provider = %state.provider,
                    bytes = state.bytes,
                    lines = state.lines,
                    "stream completed"
                );
                None
            }
            Ok(read) => {
                state.bytes = state.bytes.saturating_add(read as u64);
                state.lines = state.lines.saturating_add(1);
                Some((Ok(Bytes::from(line)), state))
            }
            Err(err) => {
                state.finished = true;
                tracing::warn!(
                    provider = %state.provider,
                    bytes = state.bytes,
                    lines = state.lines,
                    error = %err,
                    "stream read error"
                );
                Some((Err(err), state))
            }
        }
    })
}

fn truncate_for_log(body: &[u8], max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return String::from_utf8_lossy(body).into_owned();
    }
    let mut out = String::from_utf8_lossy(&body[..max_bytes]).into_owned();
    out.push_str("...(truncated)");
    out
}
