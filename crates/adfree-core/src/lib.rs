//! adfree core: transport-agnostic policy primitives and error types.
//!
//! This crate defines the policy document schema, its canonical byte form,
//! signature verification, domain pattern matching and the header codec
//! shared by the proxy and origin tooling. It carries no async runtime so it
//! can be reused by signing tools and tests.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `AdfreeError`/`Result` so hostile policy
//! headers cannot crash the proxy.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod policy;
pub mod protocol;

/// Shared result type.
pub use error::{AdfreeError, DeliveryError, ErrorKind, Result};
