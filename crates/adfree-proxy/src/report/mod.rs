//! Violation and invalid-policy reporting.
//!
//! - `transport`: single HTTP POST attempt
//! - `client`: retries, backoff, per-attempt timeout, metrics
//! - `queue`: bounded fire-and-forget queue drained by a worker pool

pub mod client;
pub mod queue;
pub mod transport;

pub use client::{ReportClient, ACCEPTED_STATUSES};
pub use queue::{ReportJob, ReportQueue, ReportWorkers};
pub use transport::{HttpReportTransport, ReportTransport};
