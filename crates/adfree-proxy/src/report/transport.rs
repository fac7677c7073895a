use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;

use adfree_core::error::{AdfreeError, DeliveryError, Result};

/// One delivery attempt: POST a JSON payload, return the response status.
///
/// Implementations report transport failures as `DeliveryError`; status
/// classification (accepted or not) is the client's job.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    async fn post_json(&self, endpoint: &str, payload: Bytes) -> std::result::Result<u16, DeliveryError>;
}

pub struct HttpReportTransport {
    client: reqwest::Client,
}

impl HttpReportTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AdfreeError::Internal(format!("report client build failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReportTransport for HttpReportTransport {
    async fn post_json(&self, endpoint: &str, payload: Bytes) -> std::result::Result<u16, DeliveryError> {
        let resp = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(classify)?;
        Ok(resp.status().as_u16())
    }
}

fn classify(e: reqwest::Error) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout
    } else if e.is_builder() {
        DeliveryError::Unexpected(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        DeliveryError::Network(e.to_string())
    } else {
        DeliveryError::Unexpected(e.to_string())
    }
}
