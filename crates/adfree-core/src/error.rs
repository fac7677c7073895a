//! Shared error types across adfree crates.

use thiserror::Error;

/// Stable error categories, used as metric labels and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range policy document.
    Schema,
    /// Origin key unavailable or malformed.
    KeyFetch,
    /// Cryptographic verification failed.
    Signature,
    /// Invalid configuration.
    Config,
    /// Upstream transport failure.
    Upstream,
    /// Internal defect.
    Internal,
}

impl ErrorKind {
    /// String representation used in metric labels and report payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Schema => "schema_error",
            ErrorKind::KeyFetch => "key_fetch_error",
            ErrorKind::Signature => "signature_error",
            ErrorKind::Config => "config_error",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, AdfreeError>;

/// Unified error type used by core and proxy.
#[derive(Debug, Error)]
pub enum AdfreeError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("key fetch error: {0}")]
    KeyFetch(String),
    #[error("signature error: {0}")]
    Signature(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AdfreeError {
    /// Map the error to its stable category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdfreeError::Schema(_) => ErrorKind::Schema,
            AdfreeError::KeyFetch(_) => ErrorKind::KeyFetch,
            AdfreeError::Signature(_) => ErrorKind::Signature,
            AdfreeError::Config(_) => ErrorKind::Config,
            AdfreeError::Upstream(_) => ErrorKind::Upstream,
            AdfreeError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Report delivery failure. Never surfaced to the response path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("endpoint answered HTTP {0}")]
    Http(u16),
    #[error("attempt timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl DeliveryError {
    /// Failure category used as the `reason` label.
    pub fn reason(&self) -> String {
        match self {
            DeliveryError::Http(code) => format!("HTTP_{code}"),
            DeliveryError::Timeout => "timeout".to_string(),
            DeliveryError::Network(_) => "network_error".to_string(),
            DeliveryError::Unexpected(_) => "unexpected_error".to_string(),
        }
    }
}
