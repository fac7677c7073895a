//! Top-level facade crate for adfree.
//!
//! Re-exports the core policy primitives and the proxy library so users can
//! depend on a single crate.

pub mod core {
    pub use adfree_core::*;
}

pub mod proxy {
    pub use adfree_proxy::*;
}
