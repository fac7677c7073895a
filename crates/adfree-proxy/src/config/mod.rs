//! Proxy config loader (strict parsing).

pub mod schema;

use std::fs;

use adfree_core::error::{AdfreeError, Result};

pub use schema::{EnforcementSection, PolicySection, ProxyConfig, ProxySection, ReportingSection};

pub fn load_from_file(path: &str) -> Result<ProxyConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| AdfreeError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ProxyConfig> {
    let cfg: ProxyConfig = serde_yaml::from_str(s)
        .map_err(|e| AdfreeError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
