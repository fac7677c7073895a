//! Shared application state for the adfree proxy.
//!
//! Built once at startup from `ProxyConfig`. Startup errors are returned,
//! never panicked on. The report worker pool is handed back separately so
//! the binary can drain it on shutdown.

use std::sync::Arc;

use adfree_core::error::Result;

use crate::config::ProxyConfig;
use crate::enforce::{Interceptor, InterceptorSettings, ResponseRewriter};
use crate::obs::ProxyMetrics;
use crate::policy::{HttpKeyFetcher, KeyFetcher, PinnedKeyFetcher, PolicyCache, PolicyValidator};
use crate::report::{HttpReportTransport, ReportClient, ReportQueue, ReportTransport, ReportWorkers};
use crate::transport::{HttpUpstream, Upstream};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ProxyConfig,
    metrics: Arc<ProxyMetrics>,
    cache: Arc<PolicyCache>,
    interceptor: Interceptor,
    upstream: Arc<dyn Upstream>,
}

impl AppState {
    /// Production wiring: reqwest-backed key fetch, upstream and reporting.
    pub fn new(cfg: ProxyConfig) -> Result<(Self, ReportWorkers)> {
        let http_keys: Arc<dyn KeyFetcher> = Arc::new(HttpKeyFetcher::new(
            cfg.policy.key_path.clone(),
            cfg.policy.key_fetch_timeout(),
            &cfg.reporting.user_agent,
        )?);

        let keys: Arc<dyn KeyFetcher> = if cfg.policy.pinned_keys.is_empty() {
            http_keys
        } else {
            let pinned = cfg
                .policy
                .pinned_keys
                .iter()
                .fold(PinnedKeyFetcher::new(Some(http_keys)), |f, (origin, key)| {
                    f.with_key(origin.clone(), key.clone().into_bytes())
                });
            tracing::info!(pinned = cfg.policy.pinned_keys.len(), "pinned origin keys loaded");
            Arc::new(pinned)
        };

        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(cfg.proxy.upstream.clone())?);
        let transport: Arc<dyn ReportTransport> = Arc::new(HttpReportTransport::new(
            &cfg.reporting.user_agent,
            cfg.reporting.attempt_timeout(),
        )?);

        Self::with_parts(cfg, keys, upstream, transport)
    }

    /// Wiring with caller-supplied collaborators. Must run inside a tokio runtime.
    pub fn with_parts(
        cfg: ProxyConfig,
        keys: Arc<dyn KeyFetcher>,
        upstream: Arc<dyn Upstream>,
        transport: Arc<dyn ReportTransport>,
    ) -> Result<(Self, ReportWorkers)> {
        cfg.validate()?;

        let metrics = Arc::new(ProxyMetrics::default());
        let cache = Arc::new(PolicyCache::new());

        let client = Arc::new(ReportClient::new(
            transport,
            Arc::clone(&metrics),
            cfg.reporting.attempt_timeout(),
            cfg.reporting.backoff_base(),
        ));
        let (reports, workers) = ReportQueue::start(
            client,
            Arc::clone(&metrics),
            cfg.reporting.queue_capacity,
            cfg.reporting.workers,
            cfg.reporting.max_retries,
        );

        let interceptor = Interceptor::new(
            PolicyValidator::new(keys),
            Arc::clone(&cache),
            ResponseRewriter::new()?,
            Arc::clone(&metrics),
            reports,
            InterceptorSettings::from_config(&cfg),
        );

        let state = Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                cache,
                interceptor,
                upstream,
            }),
        };
        Ok((state, workers))
    }

    pub fn cfg(&self) -> &ProxyConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> &ProxyMetrics {
        &self.inner.metrics
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.inner.cache
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.inner.interceptor
    }

    pub fn upstream(&self) -> Arc<dyn Upstream> {
        Arc::clone(&self.inner.upstream)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Point-in-time values rendered alongside the registry.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("adfree_policy_cache_entries", self.inner.cache.len() as u64),
            ("adfree_report_queue_depth", self.inner.interceptor.reports().depth() as u64),
            ("adfree_report_queue_capacity", self.inner.cfg.reporting.queue_capacity as u64),
        ]
    }
}
