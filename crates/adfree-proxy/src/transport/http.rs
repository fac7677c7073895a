//! Proxy handler.
//!
//! Every request not claimed by an ops route lands here. The request body is
//! buffered (bounded by `proxy.max_body_bytes`), the interceptor fetches and
//! enforces, and an upstream failure becomes 502.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::app_state::AppState;

use super::upstream::{ProxyRequest, ProxyResponse};

pub async fn proxy_handler(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let limit = state.cfg().proxy.max_body_bytes;
    let body = match to_bytes(body, limit).await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(uri = %parts.uri, error = %e, "request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let req = ProxyRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    };

    let upstream = state.upstream();
    match state.interceptor().intercept(&req, upstream.as_ref()).await {
        Ok(out) => {
            tracing::trace!(uri = %req.uri, disposition = ?out.disposition, "request handled");
            into_axum(out.response)
        }
        Err(e) => {
            tracing::warn!(uri = %req.uri, error = %e, "upstream fetch failed");
            (StatusCode::BAD_GATEWAY, "bad gateway").into_response()
        }
    }
}

/// Status, headers and body are carried over as-is.
pub fn into_axum(resp: ProxyResponse) -> Response {
    let mut out = Response::new(Body::from(resp.body));
    *out.status_mut() = resp.status;
    *out.headers_mut() = resp.headers;
    out
}
