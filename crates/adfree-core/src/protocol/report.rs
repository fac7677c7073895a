//! Report payloads (JSON, `Content-Type: application/json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Mode;

/// Protocol version tag stamped on every report.
pub const REPORT_PROTOCOL_VERSION: &str = "1";

/// What kind of content was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    IframeBlocked,
    EmbedBlocked,
}

/// What the proxy did about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    /// Tag removed from the delivered body.
    Removed,
    /// Tag left in place (report-only without rewriting).
    Observed,
}

/// One piece of content removed or blocked due to policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    #[serde(rename = "type")]
    pub kind: ViolationType,
    /// Embed source as written in the page.
    pub url: String,
    /// Host that matched `blocked_domains`.
    pub domain: String,
    pub action: ViolationAction,
    pub timestamp: DateTime<Utc>,
}

/// Report body, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportBody {
    PolicyViolation {
        origin: String,
        page_url: String,
        mode: Mode,
        violation: ViolationEvent,
    },
    InvalidPolicy {
        origin: String,
        page_url: String,
        error_type: String,
        detail: String,
    },
}

impl ReportBody {
    pub fn type_str(&self) -> &'static str {
        match self {
            ReportBody::PolicyViolation { .. } => "policy_violation",
            ReportBody::InvalidPolicy { .. } => "invalid_policy",
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            ReportBody::PolicyViolation { origin, .. } | ReportBody::InvalidPolicy { origin, .. } => {
                origin
            }
        }
    }
}

/// Body enriched with protocol version and generation time, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub protocol_version: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: ReportBody,
}

impl ReportEnvelope {
    pub fn new(body: ReportBody) -> Self {
        Self {
            protocol_version: REPORT_PROTOCOL_VERSION.to_string(),
            generated_at: Utc::now(),
            body,
        }
    }
}
