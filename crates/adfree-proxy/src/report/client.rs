use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use adfree_core::error::{DeliveryError, ErrorKind};
use adfree_core::policy::Mode;
use adfree_core::protocol::report::{ReportBody, ReportEnvelope, ViolationEvent};

use crate::obs::ProxyMetrics;

use super::transport::ReportTransport;

/// Response statuses counted as delivered.
pub const ACCEPTED_STATUSES: [u16; 4] = [200, 201, 202, 204];

/// Delivers reports with bounded retries and exponential backoff.
///
/// `max_retries + 1` attempts in total; a failed attempt `i` (0-based) is
/// followed by a `backoff_base * 2^i` pause unless it was the last one. The
/// timeout applies to each attempt, not to the whole sequence.
pub struct ReportClient {
    transport: Arc<dyn ReportTransport>,
    metrics: Arc<ProxyMetrics>,
    attempt_timeout: Duration,
    backoff_base: Duration,
}

impl ReportClient {
    pub fn new(
        transport: Arc<dyn ReportTransport>,
        metrics: Arc<ProxyMetrics>,
        attempt_timeout: Duration,
        backoff_base: Duration,
    ) -> Self {
        Self {
            transport,
            metrics,
            attempt_timeout,
            backoff_base,
        }
    }

    pub async fn send_report(&self, endpoint: &str, body: ReportBody, max_retries: u32) -> bool {
        let kind = body.type_str();
        let envelope = ReportEnvelope::new(body);
        let payload = match serde_json::to_vec(&envelope) {
            Ok(p) => Bytes::from(p),
            Err(e) => {
                tracing::error!(endpoint, error = %e, "report payload encode failed");
                let reason = DeliveryError::Unexpected(e.to_string()).reason();
                self.metrics
                    .reports_failed
                    .inc(&[("endpoint", endpoint), ("reason", reason.as_str())]);
                return false;
            }
        };

        self.metrics.reports_in_flight.inc(&[("endpoint", endpoint)]);
        let delivered = self.deliver(endpoint, kind, payload, max_retries).await;
        self.metrics.reports_in_flight.dec(&[("endpoint", endpoint)]);
        delivered
    }

    async fn deliver(&self, endpoint: &str, kind: &str, payload: Bytes, max_retries: u32) -> bool {
        let attempts = max_retries.saturating_add(1);

        for attempt in 0..attempts {
            match self.attempt(endpoint, payload.clone()).await {
                Ok(status) => {
                    let status = status.to_string();
                    self.metrics
                        .reports_sent
                        .inc(&[("endpoint", endpoint), ("status", status.as_str())]);
                    tracing::debug!(endpoint, kind, attempt = attempt + 1, %status, "report delivered");
                    return true;
                }
                Err(e) => {
                    let reason = e.reason();
                    self.metrics
                        .reports_failed
                        .inc(&[("endpoint", endpoint), ("reason", reason.as_str())]);
                    tracing::warn!(endpoint, kind, attempt = attempt + 1, error = %e, "report delivery attempt failed");

                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(endpoint, kind, attempts, "report delivery abandoned");
        false
    }

    async fn attempt(&self, endpoint: &str, payload: Bytes) -> Result<u16, DeliveryError> {
        match tokio::time::timeout(self.attempt_timeout, self.transport.post_json(endpoint, payload)).await {
            Err(_) => Err(DeliveryError::Timeout),
            Ok(Err(e)) => Err(e),
            Ok(Ok(status)) if ACCEPTED_STATUSES.contains(&status) => Ok(status),
            Ok(Ok(status)) => Err(DeliveryError::Http(status)),
        }
    }

    /// Pause after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(20))
    }

    /// Report one removed/blocked item. No endpoint => logged locally only.
    pub async fn send_violation(
        &self,
        endpoint: Option<&str>,
        origin: &str,
        page_url: &str,
        mode: Mode,
        violation: ViolationEvent,
        max_retries: u32,
    ) -> bool {
        let Some(endpoint) = endpoint else {
            tracing::info!(origin, domain = %violation.domain, url = %violation.url, "policy violation (no report_to, logged locally)");
            return false;
        };
        let body = ReportBody::PolicyViolation {
            origin: origin.to_string(),
            page_url: page_url.to_string(),
            mode,
            violation,
        };
        self.send_report(endpoint, body, max_retries).await
    }

    /// Report a policy that failed validation.
    ///
    /// Without a validated policy there is no trusted `report_to`, so callers
    /// normally pass `None` and the event is only logged.
    pub async fn send_invalid_policy(
        &self,
        endpoint: Option<&str>,
        origin: &str,
        page_url: &str,
        error_type: ErrorKind,
        detail: &str,
        max_retries: u32,
    ) -> bool {
        let Some(endpoint) = endpoint else {
            tracing::warn!(origin, error_type = error_type.as_str(), detail, "invalid policy has no report destination; logged locally");
            return false;
        };
        let body = ReportBody::InvalidPolicy {
            origin: origin.to_string(),
            page_url: page_url.to_string(),
            error_type: error_type.as_str().to_string(),
            detail: detail.to_string(),
        };
        self.send_report(endpoint, body, max_retries).await
    }
}
