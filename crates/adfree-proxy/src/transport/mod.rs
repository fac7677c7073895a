//! Transport layer (HTTP).
//!
//! `upstream` fetches origin responses; `http` is the axum handler that
//! buffers the client request and hands it to the interceptor.

pub mod http;
pub mod upstream;

pub use upstream::{HttpUpstream, ProxyRequest, ProxyResponse, Upstream};
