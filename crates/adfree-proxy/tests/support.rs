//! Test doubles shared by the proxy integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use bytes::Bytes;
use ed25519_dalek::SigningKey;
use serde_json::Value;
use tokio::sync::mpsc;

use adfree_core::error::{AdfreeError, DeliveryError, Result};
use adfree_core::policy::sign_policy_document;
use adfree_core::protocol::headers;
use adfree_proxy::policy::KeyFetcher;
use adfree_proxy::report::ReportTransport;
use adfree_proxy::transport::{ProxyRequest, ProxyResponse, Upstream};

pub const ORIGIN: &str = "https://news.example.com";
pub const COLLECTOR: &str = "https://collector.example.com/adfree";

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[11u8; 32])
}

/// `(Adfree-Policy, Adfree-Signature)` header values for `doc`.
pub fn signed_headers(doc: &Value) -> (String, String) {
    (doc.to_string(), sign_policy_document(&signing_key(), doc))
}

/// Origin-form GET for `/article` on news.example.com.
pub fn page_request(opt_in: bool) -> ProxyRequest {
    let mut req = ProxyRequest::new(Method::GET, Uri::from_static("/article?id=7"));
    req.headers
        .insert(header::HOST, HeaderValue::from_static("news.example.com"));
    if opt_in {
        req.headers.insert(headers::WANT, HeaderValue::from_static("1"));
    }
    req
}

pub fn html_response(body: &str, policy: Option<(&str, &str)>) -> ProxyResponse {
    let mut h = HeaderMap::new();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    h.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    h.insert("x-origin-marker", HeaderValue::from_static("kept"));
    if let Some((doc, sig)) = policy {
        h.insert(headers::POLICY, HeaderValue::from_str(doc).unwrap());
        h.insert(headers::SIGNATURE, HeaderValue::from_str(sig).unwrap());
        h.insert(headers::SUPPORTED, HeaderValue::from_static("1"));
    }
    ProxyResponse {
        status: StatusCode::OK,
        headers: h,
        body: Bytes::copy_from_slice(body.as_bytes()),
    }
}

/// Returns the same response for every request.
pub struct StaticUpstream(pub ProxyResponse);

#[async_trait]
impl Upstream for StaticUpstream {
    async fn fetch(&self, _req: &ProxyRequest) -> Result<ProxyResponse> {
        Ok(self.0.clone())
    }
}

pub struct FailingUpstream;

#[async_trait]
impl Upstream for FailingUpstream {
    async fn fetch(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        Err(AdfreeError::Upstream(format!("connection refused for {}", req.uri)))
    }
}

/// Serves one key for every origin and counts lookups.
pub struct CountingKeys {
    key: Bytes,
    pub calls: AtomicUsize,
}

impl CountingKeys {
    pub fn new(key: &SigningKey) -> Arc<Self> {
        Arc::new(Self {
            key: Bytes::copy_from_slice(&key.verifying_key().to_bytes()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyFetcher for CountingKeys {
    async fn fetch_key(&self, _origin: &str) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.key.clone())
    }
}

/// One observed POST.
#[derive(Debug)]
pub struct Posted {
    pub endpoint: String,
    pub body: Value,
    pub at: tokio::time::Instant,
}

/// Replays scripted outcomes (then `fallback`) and forwards every call.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<std::result::Result<u16, DeliveryError>>>,
    fallback: std::result::Result<u16, DeliveryError>,
    delay: Option<Duration>,
    tx: mpsc::UnboundedSender<Posted>,
}

impl ScriptedTransport {
    pub fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<Posted>) {
        Self::new(Vec::new(), Ok(200), None)
    }

    pub fn new(
        script: Vec<std::result::Result<u16, DeliveryError>>,
        fallback: std::result::Result<u16, DeliveryError>,
        delay: Option<Duration>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Posted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let t = Self {
            script: Mutex::new(script.into()),
            fallback,
            delay,
            tx,
        };
        (Arc::new(t), rx)
    }
}

#[async_trait]
impl ReportTransport for ScriptedTransport {
    async fn post_json(&self, endpoint: &str, payload: Bytes) -> std::result::Result<u16, DeliveryError> {
        let _ = self.tx.send(Posted {
            endpoint: endpoint.to_string(),
            body: serde_json::from_slice(&payload).unwrap(),
            at: tokio::time::Instant::now(),
        });
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
