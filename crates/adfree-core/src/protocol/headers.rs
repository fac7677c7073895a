//! Policy transport header names.
//!
//! Names are matched case-insensitively by HTTP stacks; these are the
//! canonical spellings (lowercase, as `http::HeaderName` stores them).

/// Response: JSON-encoded policy document.
pub const POLICY: &str = "adfree-policy";

/// Response: unpadded base64url signature over the canonical policy bytes.
pub const SIGNATURE: &str = "adfree-signature";

/// Response: advisory marker, not required for validation.
pub const SUPPORTED: &str = "adfree-supported";

/// Request: client opt-in. Presence alone enables enforcement.
pub const WANT: &str = "adfree-want";
