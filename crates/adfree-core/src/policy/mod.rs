//! Policy document model.
//!
//! - `schema`: typed policy document and its range checks
//! - `canonical`: deterministic byte form used for signing
//! - `domain`: `blocked_domains` pattern compilation and matching
//! - `signature`: Ed25519 verification over the canonical digest

pub mod canonical;
pub mod domain;
pub mod schema;
pub mod signature;

pub use canonical::{canonicalize, canonicalize_serializable};
pub use domain::{host_of, BlockList, DomainPattern};
pub use schema::{BotPolicy, Mode, Policy, POLICY_VERSION};
pub use signature::{decode_signature_header, parse_public_key, sign_policy_document, verify};
