//! Correlation ids for API requests.
//!
//! A proxy-supplied `x-request-id` is kept if it looks like an id (printable
//! token characters, at most 128 bytes); anything else is replaced with a
//! fresh UUID v4. The id lands on the `http_request` span, as a Sentry tag,
//! in the request extensions as [`RequestId`], and on the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Take the upstream id if acceptable, else mint one.
    fn from_header(value: Option<&HeaderValue>) -> Self {
        let upstream = value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| is_acceptable(id));
        Self(upstream.map_or_else(|| Uuid::new_v4().to_string(), String::from))
    }
}

fn is_acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

/// Tag the request with a [`RequestId`] and echo it back.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_header(request.headers().get(REQUEST_ID_HEADER));

    Span::current().record("request_id", request_id.0.as_str());
    sentry::configure_scope(|scope| scope.set_tag("request_id", &request_id.0));

    let header = HeaderValue::from_str(&request_id.0).ok();
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
