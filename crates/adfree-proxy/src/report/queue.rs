//! Bounded report queue.
//!
//! Request handling never waits on report delivery: jobs are pushed with
//! `try_send` and a fixed pool of workers drains the channel. When the
//! channel is full the job is dropped and counted.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use adfree_core::error::ErrorKind;
use adfree_core::policy::Mode;
use adfree_core::protocol::report::ViolationEvent;

use crate::obs::ProxyMetrics;

use super::client::ReportClient;

/// One unit of reporting work.
#[derive(Debug, Clone)]
pub enum ReportJob {
    Violation {
        endpoint: Option<String>,
        origin: String,
        page_url: String,
        mode: Mode,
        event: ViolationEvent,
    },
    InvalidPolicy {
        endpoint: Option<String>,
        origin: String,
        page_url: String,
        error_type: ErrorKind,
        detail: String,
    },
}

impl ReportJob {
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ReportJob::Violation { endpoint, .. } | ReportJob::InvalidPolicy { endpoint, .. } => {
                endpoint.as_deref()
            }
        }
    }

    async fn run(self, client: &ReportClient, max_retries: u32) -> bool {
        match self {
            ReportJob::Violation {
                endpoint,
                origin,
                page_url,
                mode,
                event,
            } => {
                client
                    .send_violation(endpoint.as_deref(), &origin, &page_url, mode, event, max_retries)
                    .await
            }
            ReportJob::InvalidPolicy {
                endpoint,
                origin,
                page_url,
                error_type,
                detail,
            } => {
                client
                    .send_invalid_policy(endpoint.as_deref(), &origin, &page_url, error_type, &detail, max_retries)
                    .await
            }
        }
    }
}

/// Producer handle. Cheap to clone; workers stop once every handle is dropped.
#[derive(Clone)]
pub struct ReportQueue {
    tx: mpsc::Sender<ReportJob>,
    client: Arc<ReportClient>,
    metrics: Arc<ProxyMetrics>,
    max_retries: u32,
}

/// Worker pool owned by whoever drives shutdown.
pub struct ReportWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl ReportQueue {
    pub fn start(
        client: Arc<ReportClient>,
        metrics: Arc<ProxyMetrics>,
        capacity: usize,
        workers: usize,
        max_retries: u32,
    ) -> (Self, ReportWorkers) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let client = Arc::clone(&client);
                tokio::spawn(run_worker(id, rx, client, max_retries))
            })
            .collect();

        let queue = Self {
            tx,
            client,
            metrics,
            max_retries,
        };
        (queue, ReportWorkers { handles })
    }

    /// Enqueue without waiting. Returns false when the job was not queued.
    ///
    /// Jobs without an endpoint are handled inline (local log only) and never
    /// occupy a queue slot.
    pub fn submit(&self, job: ReportJob) -> bool {
        if job.endpoint().is_none() {
            log_local(&job);
            return false;
        }

        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.metrics.reports_dropped.inc(&[("reason", "queue_full")]);
                tracing::warn!(endpoint = job.endpoint().unwrap_or_default(), "report queue full; dropping report");
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.metrics.reports_dropped.inc(&[("reason", "queue_closed")]);
                tracing::warn!(endpoint = job.endpoint().unwrap_or_default(), "report queue closed; dropping report");
                false
            }
        }
    }

    /// Deliver on the caller's task, bypassing the queue.
    pub async fn deliver_now(&self, job: ReportJob) -> bool {
        job.run(&self.client, self.max_retries).await
    }

    /// Jobs currently waiting for a worker.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl ReportWorkers {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to drain and exit. Only returns once all
    /// `ReportQueue` handles are gone.
    pub async fn join(self) {
        for res in join_all(self.handles).await {
            if let Err(e) = res {
                tracing::error!(error = %e, "report worker panicked");
            }
        }
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ReportJob>>>,
    client: Arc<ReportClient>,
    max_retries: u32,
) {
    loop {
        // Lock only while waiting for the next job.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            tracing::debug!(worker = id, "report worker stopping");
            return;
        };
        job.run(&client, max_retries).await;
    }
}

fn log_local(job: &ReportJob) {
    match job {
        ReportJob::Violation { origin, event, .. } => {
            tracing::info!(origin = %origin, domain = %event.domain, url = %event.url, "policy violation (no report_to, logged locally)");
        }
        ReportJob::InvalidPolicy {
            origin,
            error_type,
            detail,
            ..
        } => {
            tracing::warn!(origin = %origin, error_type = error_type.as_str(), detail = %detail, "invalid policy has no report destination; logged locally");
        }
    }
}
