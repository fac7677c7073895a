//! Ed25519 policy signatures.
//!
//! The signed message is the SHA-256 digest of the canonical policy bytes.
//! Verification uses `verify_strict` and rejects weak (small-order) keys.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{AdfreeError, Result};

use super::canonical::canonicalize;

/// SHA-256 digest of canonical policy bytes.
pub fn policy_digest(canonical: &[u8]) -> [u8; 32] {
    Sha256::digest(canonical).into()
}

/// Parse public key material returned by a key fetcher.
///
/// Accepted forms: raw 32 bytes, 64 hex chars, base64/base64url of 32 bytes,
/// or an SPKI PEM block.
pub fn parse_public_key(material: &[u8]) -> Result<VerifyingKey> {
    let bytes = decode_key_material(material)?;
    let key = VerifyingKey::from_bytes(&bytes)
        .map_err(|_| AdfreeError::KeyFetch("key is not a valid Ed25519 point".into()))?;
    if key.is_weak() {
        return Err(AdfreeError::KeyFetch("weak Ed25519 key rejected".into()));
    }
    Ok(key)
}

fn decode_key_material(material: &[u8]) -> Result<[u8; PUBLIC_KEY_LENGTH]> {
    if material.len() == PUBLIC_KEY_LENGTH {
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out.copy_from_slice(material);
        return Ok(out);
    }

    let text = std::str::from_utf8(material)
        .map_err(|_| AdfreeError::KeyFetch("key material is neither raw nor text".into()))?
        .trim();

    if text.starts_with("-----BEGIN") {
        let key = VerifyingKey::from_public_key_pem(text)
            .map_err(|e| AdfreeError::KeyFetch(format!("invalid PEM public key: {e}")))?;
        return Ok(key.to_bytes());
    }

    let decoded = if text.len() == PUBLIC_KEY_LENGTH * 2 && text.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(text).map_err(|e| AdfreeError::KeyFetch(format!("invalid hex key: {e}")))?
    } else {
        URL_SAFE_NO_PAD
            .decode(text.trim_end_matches('='))
            .or_else(|_| STANDARD.decode(text))
            .map_err(|e| AdfreeError::KeyFetch(format!("invalid base64 key: {e}")))?
    };

    decoded
        .try_into()
        .map_err(|v: Vec<u8>| AdfreeError::KeyFetch(format!("key must be 32 bytes, got {}", v.len())))
}

/// Verify `signature` over the canonical bytes of a policy document.
pub fn verify(key: &VerifyingKey, canonical: &[u8], signature: &[u8]) -> Result<()> {
    let sig = Signature::from_slice(signature)
        .map_err(|_| AdfreeError::Signature(format!("bad signature length: {}", signature.len())))?;
    let digest = policy_digest(canonical);
    key.verify_strict(&digest, &sig)
        .map_err(|_| AdfreeError::Signature("signature does not match policy".into()))
}

/// Sign a policy document and return the `Adfree-Signature` header value
/// (unpadded base64url). Used by origin tooling.
pub fn sign_policy_document(key: &SigningKey, document: &Value) -> String {
    let digest = policy_digest(&canonicalize(document));
    URL_SAFE_NO_PAD.encode(key.sign(&digest).to_bytes())
}

/// Decode an `Adfree-Signature` header: base64url, padding restored first.
pub fn decode_signature_header(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim().trim_end_matches('=');
    let pad = (4 - trimmed.len() % 4) % 4;
    let mut padded = String::with_capacity(trimmed.len() + pad);
    padded.push_str(trimmed);
    padded.extend(std::iter::repeat('=').take(pad));
    URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| AdfreeError::Signature(format!("signature is not base64url: {e}")))
}
