//! Upstream transport seam.
//!
//! The enforcement pipeline only needs "give me the upstream response for
//! this request". `HttpUpstream` is the reverse-proxy implementation used by
//! the binary; tests plug in their own.

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri};
use bytes::Bytes;

use adfree_core::error::{AdfreeError, Result};

/// Request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, req: &ProxyRequest) -> Result<ProxyResponse>;
}

/// Connection-level headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for h in HOP_BY_HOP.iter() {
        headers.remove(h);
    }
    headers.remove(header::UPGRADE);
    headers.remove("keep-alive");
}

/// Reverse proxy to a fixed base URL.
pub struct HttpUpstream {
    client: reqwest::Client,
    base: String,
}

impl HttpUpstream {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AdfreeError::Internal(format!("upstream client build failed: {e}")))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    fn target(&self, uri: &Uri) -> String {
        let pq = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        format!("{}{}", self.base, pq)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        let mut headers = req.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let url = self.target(&req.uri);
        let resp = self
            .client
            .request(req.method.clone(), &url)
            .headers(headers)
            .body(req.body.clone())
            .send()
            .await
            .map_err(|e| AdfreeError::Upstream(format!("{} {url}: {e}", req.method)))?;

        let status = resp.status();
        let mut headers = resp.headers().clone();
        strip_hop_by_hop(&mut headers);

        let body = resp
            .bytes()
            .await
            .map_err(|e| AdfreeError::Upstream(format!("body read failed: {e}")))?;

        Ok(ProxyResponse { status, headers, body })
    }
}
