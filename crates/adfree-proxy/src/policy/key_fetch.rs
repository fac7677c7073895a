//! Origin public key resolution.
//!
//! The validator only sees the `KeyFetcher` trait. Failures of any kind
//! surface as `AdfreeError::KeyFetch`; the validator never falls back to
//! trusting an unverified policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use adfree_core::error::{AdfreeError, Result};

/// Returns raw public key material for an origin.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_key(&self, origin: &str) -> Result<Bytes>;
}

/// HTTPS GET of `{origin}{key_path}`.
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    key_path: String,
}

impl HttpKeyFetcher {
    pub fn new(key_path: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AdfreeError::Internal(format!("key fetch client build failed: {e}")))?;
        Ok(Self {
            client,
            key_path: key_path.into(),
        })
    }

    pub fn key_url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.key_path)
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_key(&self, origin: &str) -> Result<Bytes> {
        let url = self.key_url(origin);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdfreeError::KeyFetch(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(AdfreeError::KeyFetch(format!("GET {url} answered {status}")));
        }

        resp.bytes()
            .await
            .map_err(|e| AdfreeError::KeyFetch(format!("GET {url} body read failed: {e}")))
    }
}

/// Statically configured keys, with an optional fetcher for other origins.
pub struct PinnedKeyFetcher {
    keys: HashMap<String, Bytes>,
    fallback: Option<Arc<dyn KeyFetcher>>,
}

impl PinnedKeyFetcher {
    pub fn new(fallback: Option<Arc<dyn KeyFetcher>>) -> Self {
        Self {
            keys: HashMap::new(),
            fallback,
        }
    }

    pub fn with_key(mut self, origin: impl Into<String>, material: impl Into<Bytes>) -> Self {
        self.keys.insert(normalize_origin(&origin.into()), material.into());
        self
    }
}

#[async_trait]
impl KeyFetcher for PinnedKeyFetcher {
    async fn fetch_key(&self, origin: &str) -> Result<Bytes> {
        if let Some(k) = self.keys.get(&normalize_origin(origin)) {
            return Ok(k.clone());
        }
        match &self.fallback {
            Some(f) => f.fetch_key(origin).await,
            None => Err(AdfreeError::KeyFetch(format!("no key pinned for {origin}"))),
        }
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}
