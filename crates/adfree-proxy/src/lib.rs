//! adfree proxy library entry.
//!
//! Wires config, policy validation and caching, HTML enforcement, report
//! delivery, metrics and the HTTP surface into one proxy stack. Consumed by
//! the binaries and by integration tests.

pub mod app_state;
pub mod config;
pub mod enforce;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod report;
pub mod router;
pub mod transport;
