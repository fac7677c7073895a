//! Per-request enforcement.
//!
//! `PassThrough` (opt-out, no policy headers, rejected policy, body not
//! rewritable) returns the upstream response untouched. Otherwise the
//! validated policy drives one rewrite pass and violations are queued for
//! reporting. Report delivery never happens on this path.

use std::sync::Arc;
use std::time::Instant;

use axum::http::uri::Authority;
use axum::http::{header, HeaderValue};
use bytes::Bytes;

use adfree_core::error::{AdfreeError, ErrorKind, Result};
use adfree_core::policy::Mode;
use adfree_core::protocol::headers;

use crate::config::ProxyConfig;
use crate::obs::ProxyMetrics;
use crate::policy::{PolicyCache, PolicyValidator, ValidatedPolicy};
use crate::report::{ReportJob, ReportQueue};
use crate::transport::upstream::{ProxyRequest, ProxyResponse, Upstream};

use super::rewriter::{ResponseRewriter, RewritePlan, REASON_BLOCKED_DOMAIN};

/// Knobs taken from `ProxyConfig` at startup.
#[derive(Debug, Clone)]
pub struct InterceptorSettings {
    pub default_scheme: String,
    pub max_body_bytes: usize,
    pub reuse_cached: bool,
    pub report_only_rewrites: bool,
}

impl InterceptorSettings {
    pub fn from_config(cfg: &ProxyConfig) -> Self {
        Self {
            default_scheme: cfg.proxy.default_scheme.clone(),
            max_body_bytes: cfg.proxy.max_body_bytes,
            reuse_cached: cfg.policy.reuse_cached,
            report_only_rewrites: cfg.enforcement.report_only_rewrites,
        }
    }
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

/// Why a response was returned untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    OptOut,
    NoPolicyHeaders,
    NoOrigin,
    Rejected(ErrorKind),
    NotHtml,
    Encoded,
    TooLarge,
    NotUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    PassThrough(PassReason),
    /// Policy applied; body may or may not have changed.
    Rewritten {
        violations: usize,
        script_injected: bool,
    },
    /// Report-only without rewriting: violations found, body untouched.
    Observed { violations: usize },
}

#[derive(Debug)]
pub struct Intercepted {
    pub response: ProxyResponse,
    pub disposition: Disposition,
}

impl Intercepted {
    fn pass(response: ProxyResponse, reason: PassReason) -> Self {
        Self {
            response,
            disposition: Disposition::PassThrough(reason),
        }
    }
}

pub struct Interceptor {
    validator: PolicyValidator,
    cache: Arc<PolicyCache>,
    rewriter: ResponseRewriter,
    metrics: Arc<ProxyMetrics>,
    reports: ReportQueue,
    settings: InterceptorSettings,
}

impl Interceptor {
    pub fn new(
        validator: PolicyValidator,
        cache: Arc<PolicyCache>,
        rewriter: ResponseRewriter,
        metrics: Arc<ProxyMetrics>,
        reports: ReportQueue,
        settings: InterceptorSettings,
    ) -> Self {
        Self {
            validator,
            cache,
            rewriter,
            metrics,
            reports,
            settings,
        }
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    pub fn reports(&self) -> &ReportQueue {
        &self.reports
    }

    /// Fetch the upstream response for `req` and enforce its policy.
    ///
    /// Only upstream transport failures are returned as errors; every policy
    /// problem degrades to pass-through.
    pub async fn intercept(&self, req: &ProxyRequest, upstream: &dyn Upstream) -> Result<Intercepted> {
        self.metrics
            .requests
            .inc(&[("method", req.method.as_str()), ("path", req.uri.path())]);

        let response = upstream.fetch(req).await?;

        if !req.headers.contains_key(headers::WANT) {
            return Ok(Intercepted::pass(response, PassReason::OptOut));
        }

        let (document_value, signature_value) = match (
            response.headers.get(headers::POLICY),
            response.headers.get(headers::SIGNATURE),
        ) {
            (Some(d), Some(s)) => (d.clone(), s.clone()),
            _ => return Ok(Intercepted::pass(response, PassReason::NoPolicyHeaders)),
        };

        let Some(origin) = request_origin(req, &self.settings.default_scheme) else {
            tracing::debug!(uri = %req.uri, "cannot determine request origin");
            return Ok(Intercepted::pass(response, PassReason::NoOrigin));
        };
        let page_url = page_url(&origin, req);

        let resolved = match (
            header_text(&document_value, headers::POLICY, AdfreeError::Schema),
            header_text(&signature_value, headers::SIGNATURE, AdfreeError::Signature),
        ) {
            (Ok(d), Ok(s)) => self.resolve(&origin, d, s).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        let policy = match resolved {
            Ok(p) => p,
            Err(e) => {
                self.reject(&origin, &page_url, &e);
                return Ok(Intercepted::pass(response, PassReason::Rejected(e.kind())));
            }
        };

        Ok(self.enforce(response, &policy, &page_url))
    }

    /// Cached policy when the header pair is byte-identical, else full validation.
    async fn resolve(
        &self,
        origin: &str,
        raw_document: &str,
        raw_signature: &str,
    ) -> Result<Arc<ValidatedPolicy>> {
        if self.settings.reuse_cached {
            if let Some(cached) = self.cache.get(origin) {
                if cached.is_same_source(raw_document, raw_signature) {
                    tracing::trace!(origin, "policy cache hit");
                    return Ok(cached);
                }
            }
        }

        let validated = Arc::new(self.validator.validate(raw_document, raw_signature, origin).await?);
        self.cache.put(origin, Arc::clone(&validated));
        tracing::debug!(origin, mode = validated.policy().mode.as_str(), "policy validated");
        Ok(validated)
    }

    fn reject(&self, origin: &str, page_url: &str, err: &AdfreeError) {
        let kind = err.kind();
        self.metrics
            .validation_errors
            .inc(&[("origin", origin), ("error_type", kind.as_str())]);
        tracing::warn!(origin, error_type = kind.as_str(), error = %err, "policy rejected; passing response through");

        // No validated policy means no trusted report_to.
        self.reports.submit(ReportJob::InvalidPolicy {
            endpoint: None,
            origin: origin.to_string(),
            page_url: page_url.to_string(),
            error_type: kind,
            detail: err.to_string(),
        });
    }

    fn enforce(&self, mut response: ProxyResponse, policy: &ValidatedPolicy, page_url: &str) -> Intercepted {
        if let Some(reason) = self.unrewritable(&response) {
            tracing::debug!(origin = policy.origin(), ?reason, "response not rewritable");
            return Intercepted::pass(response, reason);
        }
        let body = response.body.clone();
        let Ok(html) = std::str::from_utf8(&body) else {
            return Intercepted::pass(response, PassReason::NotUtf8);
        };

        let mode = policy.policy().mode;
        let apply = match mode {
            Mode::Strict | Mode::Relaxed => true,
            Mode::ReportOnly => self.settings.report_only_rewrites,
        };
        let plan = RewritePlan {
            blocked: policy.blocked(),
            suppress_redirects: !policy.policy().allow_redirects,
            apply,
        };

        let started = Instant::now();
        let outcome = self.rewriter.rewrite(html, plan);
        self.metrics
            .rewrite_duration
            .observe(&[("mode", mode.as_str())], started.elapsed());

        let changed = outcome.changed(html);
        let violations = outcome.violations.len();

        for event in outcome.violations {
            self.metrics
                .blocked
                .inc(&[("reason", REASON_BLOCKED_DOMAIN), ("domain", event.domain.as_str())]);
            self.reports.submit(ReportJob::Violation {
                endpoint: policy.report_to().map(str::to_string),
                origin: policy.origin().to_string(),
                page_url: page_url.to_string(),
                mode,
                event,
            });
        }

        if !apply {
            return Intercepted {
                response,
                disposition: Disposition::Observed { violations },
            };
        }

        if changed {
            response.body = Bytes::from(outcome.body);
            response
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(response.body.len()));
        }

        Intercepted {
            response,
            disposition: Disposition::Rewritten {
                violations,
                script_injected: outcome.script_injected,
            },
        }
    }

    fn unrewritable(&self, response: &ProxyResponse) -> Option<PassReason> {
        let is_html = response
            .header_str(header::CONTENT_TYPE.as_str())
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            return Some(PassReason::NotHtml);
        }

        let encoded = response
            .header_str(header::CONTENT_ENCODING.as_str())
            .map(|ce| !ce.trim().eq_ignore_ascii_case("identity"))
            .unwrap_or(false);
        if encoded {
            return Some(PassReason::Encoded);
        }

        if response.body.len() > self.settings.max_body_bytes {
            return Some(PassReason::TooLarge);
        }
        None
    }
}

/// `scheme://host[:port]`, lowercased. Absolute-form URIs win over `Host`.
pub fn request_origin(req: &ProxyRequest, default_scheme: &str) -> Option<String> {
    let (scheme, authority) = match (req.uri.scheme_str(), req.uri.authority()) {
        (Some(scheme), Some(authority)) => (scheme, authority.clone()),
        _ => {
            let host = req.headers.get(header::HOST)?.to_str().ok()?;
            let authority: Authority = host.trim().parse().ok()?;
            (default_scheme, authority)
        }
    };

    let scheme = scheme.to_ascii_lowercase();
    let host = authority.host().to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(match authority.port_u16() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    })
}

/// Header bytes as text. Present but undecodable policy headers are a
/// rejection, not a missing policy.
fn header_text<'v>(value: &'v HeaderValue, name: &str, err: fn(String) -> AdfreeError) -> Result<&'v str> {
    std::str::from_utf8(value.as_bytes()).map_err(|e| err(format!("{name} header is not valid UTF-8: {e}")))
}

fn page_url(origin: &str, req: &ProxyRequest) -> String {
    let pq = req.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{origin}{pq}")
}
