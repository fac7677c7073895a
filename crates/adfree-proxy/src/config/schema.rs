use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use adfree_core::error::{AdfreeError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub version: u32,

    #[serde(default)]
    pub proxy: ProxySection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub enforcement: EnforcementSection,

    #[serde(default)]
    pub reporting: ReportingSection,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(AdfreeError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.proxy.validate()?;
        self.policy.validate()?;
        self.reporting.validate()?;

        Ok(())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            proxy: ProxySection::default(),
            policy: PolicySection::default(),
            enforcement: EnforcementSection::default(),
            reporting: ReportingSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_upstream")]
    pub upstream: String,

    #[serde(default = "default_scheme")]
    pub default_scheme: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream: default_upstream(),
            default_scheme: default_scheme(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ProxySection {
    pub fn validate(&self) -> Result<()> {
        if !(self.upstream.starts_with("http://") || self.upstream.starts_with("https://")) {
            return Err(AdfreeError::Config(
                "proxy.upstream must be an http(s) base URL".into(),
            ));
        }
        if !matches!(self.default_scheme.as_str(), "http" | "https") {
            return Err(AdfreeError::Config(
                "proxy.default_scheme must be http or https".into(),
            ));
        }
        if !(1024..=64 * 1024 * 1024).contains(&self.max_body_bytes) {
            return Err(AdfreeError::Config(
                "proxy.max_body_bytes must be between 1024 and 67108864".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_upstream() -> String {
    "http://127.0.0.1:9000".into()
}
fn default_scheme() -> String {
    "https".into()
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    #[serde(default = "default_key_path")]
    pub key_path: String,

    #[serde(default = "default_key_fetch_timeout_ms")]
    pub key_fetch_timeout_ms: u64,

    /// Skip key fetch + verify when the origin resends byte-identical headers.
    #[serde(default = "default_true")]
    pub reuse_cached: bool,

    /// origin -> key material (hex, base64 or PEM), consulted before HTTP.
    #[serde(default)]
    pub pinned_keys: BTreeMap<String, String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            key_path: default_key_path(),
            key_fetch_timeout_ms: default_key_fetch_timeout_ms(),
            reuse_cached: true,
            pinned_keys: BTreeMap::new(),
        }
    }
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        if !self.key_path.starts_with('/') {
            return Err(AdfreeError::Config("policy.key_path must start with '/'".into()));
        }
        if !(100..=60000).contains(&self.key_fetch_timeout_ms) {
            return Err(AdfreeError::Config(
                "policy.key_fetch_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        for (origin, material) in &self.pinned_keys {
            adfree_core::policy::parse_public_key(material.as_bytes()).map_err(|e| {
                AdfreeError::Config(format!("policy.pinned_keys[{origin}]: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn key_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.key_fetch_timeout_ms)
    }
}

fn default_key_path() -> String {
    "/.well-known/adfree-key".into()
}
fn default_key_fetch_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnforcementSection {
    /// Rewrite bodies in `report-only` mode too (violations are reported either way).
    #[serde(default = "default_true")]
    pub report_only_rewrites: bool,
}

impl Default for EnforcementSection {
    fn default() -> Self {
        Self {
            report_only_rewrites: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportingSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            user_agent: default_user_agent(),
        }
    }
}

impl ReportingSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > 10 {
            return Err(AdfreeError::Config(
                "reporting.max_retries must be at most 10".into(),
            ));
        }
        if !(100..=120000).contains(&self.attempt_timeout_ms) {
            return Err(AdfreeError::Config(
                "reporting.attempt_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if !(1..=60000).contains(&self.backoff_base_ms) {
            return Err(AdfreeError::Config(
                "reporting.backoff_base_ms must be between 1 and 60000".into(),
            ));
        }
        if !(1..=65536).contains(&self.queue_capacity) {
            return Err(AdfreeError::Config(
                "reporting.queue_capacity must be between 1 and 65536".into(),
            ));
        }
        if !(1..=64).contains(&self.workers) {
            return Err(AdfreeError::Config(
                "reporting.workers must be between 1 and 64".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(AdfreeError::Config("reporting.user_agent must not be empty".into()));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_attempt_timeout_ms() -> u64 {
    10000
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_workers() -> usize {
    4
}
fn default_user_agent() -> String {
    concat!("adfree-proxy/", env!("CARGO_PKG_VERSION")).into()
}
