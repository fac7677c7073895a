use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdfreeError, Result};

use super::domain::BlockList;

/// The only policy version this crate understands.
pub const POLICY_VERSION: &str = "1";

/// Enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Strict,
    Relaxed,
    ReportOnly,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Relaxed => "relaxed",
            Mode::ReportOnly => "report-only",
        }
    }
}

/// Origin-issued policy document (`Adfree-Policy` header).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub version: String,

    pub mode: Mode,

    /// Advisory; not mechanically enforced.
    #[serde(default)]
    pub max_ads_per_page: u32,

    #[serde(default = "default_allow_redirects")]
    pub allow_redirects: bool,

    #[serde(default = "default_allow_iframes")]
    pub allow_iframes: Vec<String>,

    #[serde(default)]
    pub blocked_domains: Vec<String>,

    #[serde(default)]
    pub report_to: Option<String>,

    #[serde(default)]
    pub bot_policy: Option<BotPolicy>,
}

/// Requirements for automated clients. Parsed and carried, not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotPolicy {
    #[serde(default)]
    pub payment_required: bool,

    #[serde(default)]
    pub payment_endpoint: Option<String>,

    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,

    #[serde(default)]
    pub allowed_agents: Vec<String>,
}

fn default_allow_redirects() -> bool {
    true
}

fn default_allow_iframes() -> Vec<String> {
    vec!["self".to_string()]
}

impl Policy {
    /// Parse and schema-check a raw policy document, compiling its block list.
    pub fn parse(raw: &Value) -> Result<(Self, BlockList)> {
        if !raw.is_object() {
            return Err(AdfreeError::Schema("policy must be a JSON object".into()));
        }
        let policy: Policy = serde_json::from_value(raw.clone())
            .map_err(|e| AdfreeError::Schema(format!("invalid policy: {e}")))?;
        let blocked = policy.validate()?;
        Ok((policy, blocked))
    }

    /// Range checks serde cannot express. Returns the compiled block list.
    pub fn validate(&self) -> Result<BlockList> {
        if self.version != POLICY_VERSION {
            return Err(AdfreeError::Schema(format!(
                "unsupported policy version: {}",
                self.version
            )));
        }

        if let Some(url) = &self.report_to {
            if !is_http_url(url) {
                return Err(AdfreeError::Schema(format!(
                    "report_to must be an http(s) URL: {url}"
                )));
            }
        }

        if let Some(bot) = &self.bot_policy {
            if let Some(url) = &bot.payment_endpoint {
                if !is_http_url(url) {
                    return Err(AdfreeError::Schema(format!(
                        "bot_policy.payment_endpoint must be an http(s) URL: {url}"
                    )));
                }
            }
        }

        if self.allow_iframes.iter().any(|s| s.trim().is_empty()) {
            return Err(AdfreeError::Schema("allow_iframes entries must not be empty".into()));
        }

        BlockList::compile(&self.blocked_domains)
    }
}

fn is_http_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    matches!(rest, Some(r) if !r.is_empty())
}
