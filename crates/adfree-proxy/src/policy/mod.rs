//! Policy layer (key resolution, validation, per-origin cache).
//!
//! Turns `Adfree-Policy` / `Adfree-Signature` header pairs into
//! `ValidatedPolicy` values the enforcement pipeline can trust.

pub mod cache;
pub mod key_fetch;
pub mod validator;

pub use cache::PolicyCache;
pub use key_fetch::{HttpKeyFetcher, KeyFetcher, PinnedKeyFetcher};
pub use validator::{PolicyValidator, ValidatedPolicy};
