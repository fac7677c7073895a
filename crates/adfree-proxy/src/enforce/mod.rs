//! Enforcement pipeline: interception and HTML rewriting.

pub mod interceptor;
pub mod rewriter;

pub use interceptor::{
    request_origin, Disposition, Intercepted, Interceptor, InterceptorSettings, PassReason,
};
pub use rewriter::{ResponseRewriter, RewriteOutcome, RewritePlan};
