//! Wire contracts between origin, proxy, client and report collector.
//!
//! - `headers`: request/response header names of the policy transport
//! - `report`: JSON payloads posted to a policy's `report_to` endpoint

pub mod headers;
pub mod report;
