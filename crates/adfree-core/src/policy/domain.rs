//! Domain pattern compilation and matching.
//!
//! `blocked_domains` entries are either exact hosts (`ads.example.com`) or
//! wildcard suffix patterns (`*.adserver.com`). A wildcard matches strict
//! subdomains only: `*.x.com` matches `a.x.com` and `a.b.x.com`, never `x.com`.

use crate::error::{AdfreeError, Result};

/// Compiled `blocked_domains` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    Exact(String),
    /// Stored with the leading dot (`*.x.com` => `.x.com`).
    Suffix(String),
}

impl DomainPattern {
    /// Compile one raw entry. Hosts are compared case-insensitively.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = normalize_host(raw);
        if s.is_empty() {
            return Err(AdfreeError::Schema("blocked_domains entry is empty".into()));
        }

        if let Some(rest) = s.strip_prefix("*.") {
            validate_labels(raw, rest)?;
            return Ok(DomainPattern::Suffix(format!(".{rest}")));
        }

        validate_labels(raw, &s)?;
        Ok(DomainPattern::Exact(s))
    }

    /// Match an already-normalized host.
    pub fn matches(&self, host: &str) -> bool {
        match self {
            DomainPattern::Exact(d) => host == d,
            DomainPattern::Suffix(sfx) => host.len() > sfx.len() && host.ends_with(sfx.as_str()),
        }
    }

    /// Original pattern text (for logs and reports).
    pub fn as_pattern(&self) -> String {
        match self {
            DomainPattern::Exact(d) => d.clone(),
            DomainPattern::Suffix(sfx) => format!("*{sfx}"),
        }
    }
}

fn validate_labels(raw: &str, host: &str) -> Result<()> {
    if host.is_empty() || host.contains('*') {
        return Err(AdfreeError::Schema(format!(
            "invalid blocked_domains entry: {raw} (wildcard only allowed as leading '*.')"
        )));
    }
    if host.split('.').any(str::is_empty) {
        return Err(AdfreeError::Schema(format!(
            "invalid blocked_domains entry: {raw} (empty label)"
        )));
    }
    if host
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_'))
    {
        return Err(AdfreeError::Schema(format!(
            "invalid blocked_domains entry: {raw} (unexpected character)"
        )));
    }
    Ok(())
}

/// Compiled list of blocked domain patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    patterns: Vec<DomainPattern>,
}

impl BlockList {
    pub fn compile(raw: &[String]) -> Result<Self> {
        let patterns = raw
            .iter()
            .map(|s| DomainPattern::parse(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[DomainPattern] {
        &self.patterns
    }

    /// First pattern matching `host`, if any.
    pub fn find(&self, host: &str) -> Option<&DomainPattern> {
        let host = normalize_host(host);
        self.patterns.iter().find(|p| p.matches(&host))
    }

    pub fn is_blocked(&self, host: &str) -> bool {
        self.find(host).is_some()
    }
}

/// Lowercase and strip surrounding whitespace and a trailing root dot.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Extract the host of an embed source URL.
///
/// Returns `None` for relative URLs and non-network schemes (`data:`,
/// `javascript:`, `about:`); those load from the page itself or nowhere and
/// never match a blocked domain.
pub fn host_of(src: &str) -> Option<String> {
    let s = src.trim();
    let lower = s.to_ascii_lowercase();

    let rest = if let Some(r) = lower.strip_prefix("https://") {
        r
    } else if let Some(r) = lower.strip_prefix("http://") {
        r
    } else if let Some(r) = lower.strip_prefix("//") {
        r
    } else {
        return None;
    };

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = match authority.rfind('@') {
        Some(at) => &authority[at + 1..],
        None => authority,
    };

    let host = if host_port.starts_with('[') {
        // Bracketed IPv6 literal, keep brackets.
        match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => return None,
        }
    } else {
        match host_port.rfind(':') {
            Some(pos) if host_port[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
                &host_port[..pos]
            }
            _ => host_port,
        }
    };

    let host = normalize_host(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
