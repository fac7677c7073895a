//! HTML body rewriting.
//!
//! Order within one pass is fixed: embed blocking, then redirect
//! suppression. Embed blocking repeats until a scan removes nothing, so
//! fragments that join into a new tag after a removal are caught too.
//! Rewriting an already rewritten body yields the same bytes and no new
//! violations.

use chrono::Utc;
use regex::{Captures, Regex};

use adfree_core::error::{AdfreeError, Result};
use adfree_core::policy::{host_of, BlockList};
use adfree_core::protocol::report::{ViolationAction, ViolationEvent, ViolationType};

/// Marker id of the injected navigation guard.
pub const NAV_GUARD_ID: &str = "adfree-nav-guard";

/// Best-effort redirect guard. Page script cannot freeze `window.location`,
/// so only popups and unload navigation are intercepted.
pub const NAV_GUARD_SCRIPT: &str = concat!(
    "<script id=\"adfree-nav-guard\">(function(){",
    "try{window.open=function(){return null;};}catch(e){}",
    "window.addEventListener('beforeunload',function(e){e.preventDefault();e.returnValue='';});",
    "})();</script>"
);

/// `blocked_domains` reason label.
pub const REASON_BLOCKED_DOMAIN: &str = "blocked_domain";

/// Attribute run of an opening tag; quoted values may contain `>`.
const TAG_ATTRS: &str = r#"(?:[^>"']|"[^"]*"|'[^']*')*"#;

/// Removal passes are bounded; each pass that records a violation shrinks
/// the body, so real input settles long before this.
const MAX_STRIP_PASSES: usize = 64;

/// What to do with one body.
#[derive(Debug, Clone, Copy)]
pub struct RewritePlan<'a> {
    pub blocked: &'a BlockList,
    pub suppress_redirects: bool,
    /// false => scan and report only, body left untouched.
    pub apply: bool,
}

#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub body: String,
    pub violations: Vec<ViolationEvent>,
    pub script_injected: bool,
}

impl RewriteOutcome {
    pub fn changed(&self, original: &str) -> bool {
        self.body != original
    }
}

/// Compiled tag scanners. Construct once, share via `Arc`.
pub struct ResponseRewriter {
    embed_tag: Regex,
    attr: Regex,
}

impl ResponseRewriter {
    pub fn new() -> Result<Self> {
        // 1: self-closed iframe | 2: paired (or unclosed) iframe | 3: embed
        let embed_tag = Regex::new(&format!(
            r"(?is)(<iframe\b{TAG_ATTRS}/>)|(<iframe\b{TAG_ATTRS}>)(?:.*?</iframe\s*>)?|(<embed\b{TAG_ATTRS}>)(?:\s*</embed\s*>)?"
        ))
        .map_err(|e| AdfreeError::Internal(format!("embed tag regex: {e}")))?;

        let attr = Regex::new(r#"(?s)([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
            .map_err(|e| AdfreeError::Internal(format!("attr regex: {e}")))?;

        Ok(Self { embed_tag, attr })
    }

    pub fn rewrite(&self, html: &str, plan: RewritePlan<'_>) -> RewriteOutcome {
        let action = if plan.apply {
            ViolationAction::Removed
        } else {
            ViolationAction::Observed
        };

        let mut violations = Vec::new();

        if !plan.apply {
            if !plan.blocked.is_empty() {
                self.strip_pass(html, plan.blocked, action, false, &mut violations);
            }
            return RewriteOutcome {
                body: html.to_string(),
                violations,
                script_injected: false,
            };
        }

        // 1) embed blocking, to a fixed point
        let mut stripped = html.to_string();
        if !plan.blocked.is_empty() {
            for _ in 0..MAX_STRIP_PASSES {
                let before = violations.len();
                stripped = self.strip_pass(&stripped, plan.blocked, action, true, &mut violations);
                if violations.len() == before {
                    break;
                }
            }
        }

        // 2) redirect suppression
        let (body, script_injected) = if plan.suppress_redirects {
            inject_nav_guard(stripped)
        } else {
            (stripped, false)
        };

        RewriteOutcome {
            body,
            violations,
            script_injected,
        }
    }

    /// One scan over `html`; blocked tags are dropped when `remove` is set.
    fn strip_pass(
        &self,
        html: &str,
        blocked: &BlockList,
        action: ViolationAction,
        remove: bool,
        violations: &mut Vec<ViolationEvent>,
    ) -> String {
        self.embed_tag
            .replace_all(html, |caps: &Captures<'_>| {
                let tag = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                let kind = if caps.get(3).is_some() {
                    ViolationType::EmbedBlocked
                } else {
                    ViolationType::IframeBlocked
                };
                let open = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or(tag);

                match self.blocked_violation(open, kind, blocked, action) {
                    Some(v) => {
                        violations.push(v);
                        if remove { String::new() } else { tag.to_string() }
                    }
                    None => tag.to_string(),
                }
            })
            .into_owned()
    }

    fn blocked_violation(
        &self,
        open: &str,
        kind: ViolationType,
        blocked: &BlockList,
        action: ViolationAction,
    ) -> Option<ViolationEvent> {
        let src = self.src_of(open)?;
        let host = host_of(src)?;
        blocked.find(&host)?;

        Some(ViolationEvent {
            kind,
            url: src.to_string(),
            domain: host,
            action,
            timestamp: Utc::now(),
        })
    }

    /// First `src` attribute of an opening tag. Attributes are walked in
    /// order, so text inside another attribute's quoted value never counts.
    fn src_of<'t>(&self, open: &'t str) -> Option<&'t str> {
        let rest = open.get(1..)?;
        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());

        let caps = self
            .attr
            .captures_iter(&rest[name_end..])
            .find(|c| c.get(1).is_some_and(|n| n.as_str().eq_ignore_ascii_case("src")))?;
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
        Some(value.as_str().trim())
    }
}

/// Insert the guard before `</head>`, else before `</body>`, else at the end.
/// A body that already carries the guard script is returned unchanged.
fn inject_nav_guard(mut body: String) -> (String, bool) {
    if body.contains(NAV_GUARD_SCRIPT) {
        return (body, false);
    }

    // ASCII lowercasing keeps byte offsets aligned with `body`.
    let lower = body.to_ascii_lowercase();
    let at = lower.find("</head>").or_else(|| lower.find("</body>"));

    match at {
        Some(pos) => body.insert_str(pos, NAV_GUARD_SCRIPT),
        None => body.push_str(NAV_GUARD_SCRIPT),
    }
    (body, true)
}
