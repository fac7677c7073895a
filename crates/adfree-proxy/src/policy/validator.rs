use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;

use adfree_core::error::{AdfreeError, Result};
use adfree_core::policy::{
    canonicalize, decode_signature_header, parse_public_key, verify, BlockList, Policy,
};

use super::key_fetch::KeyFetcher;

/// A policy that passed schema, key resolution and signature checks for one origin.
///
/// Only `PolicyValidator` constructs these.
#[derive(Debug, Clone)]
pub struct ValidatedPolicy {
    origin: String,
    policy: Policy,
    blocked: BlockList,
    raw_document: String,
    raw_signature: String,
    validated_at: SystemTime,
}

impl ValidatedPolicy {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn blocked(&self) -> &BlockList {
        &self.blocked
    }

    pub fn report_to(&self) -> Option<&str> {
        self.policy.report_to.as_deref()
    }

    pub fn validated_at(&self) -> SystemTime {
        self.validated_at
    }

    /// Whether this entry was validated from exactly these header values.
    pub fn is_same_source(&self, raw_document: &str, raw_signature: &str) -> bool {
        self.raw_document == raw_document && self.raw_signature == raw_signature
    }
}

/// Validates `Adfree-Policy` + `Adfree-Signature` header pairs.
///
/// Steps, each short-circuiting: schema, key resolution, signature.
/// Stateless; safe to share across requests.
pub struct PolicyValidator {
    fetcher: Arc<dyn KeyFetcher>,
}

impl PolicyValidator {
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn validate(
        &self,
        raw_document: &str,
        raw_signature: &str,
        origin: &str,
    ) -> Result<ValidatedPolicy> {
        // 1) schema
        let document: Value = serde_json::from_str(raw_document)
            .map_err(|e| AdfreeError::Schema(format!("policy is not valid JSON: {e}")))?;
        let (policy, blocked) = Policy::parse(&document)?;

        // 2) key resolution
        let material = self.fetcher.fetch_key(origin).await?;
        let key = parse_public_key(&material)?;

        // 3) signature over the canonical form of the document as received
        let signature = decode_signature_header(raw_signature)?;
        verify(&key, &canonicalize(&document), &signature)?;

        Ok(ValidatedPolicy {
            origin: origin.to_string(),
            policy,
            blocked,
            raw_document: raw_document.to_string(),
            raw_signature: raw_signature.to_string(),
            validated_at: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::key_fetch::PinnedKeyFetcher;
    use adfree_core::policy::sign_policy_document;
    use ed25519_dalek::SigningKey;
    use serde_json::json;

    const ORIGIN: &str = "https://news.example.com";

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[3u8; 32])
    }

    fn validator() -> PolicyValidator {
        let fetcher = PinnedKeyFetcher::new(None)
            .with_key(ORIGIN, key().verifying_key().to_bytes().to_vec());
        PolicyValidator::new(Arc::new(fetcher))
    }

    fn signed(doc: &Value) -> (String, String) {
        (doc.to_string(), sign_policy_document(&key(), doc))
    }

    #[tokio::test]
    async fn valid_policy_is_accepted() {
        let doc = json!({"version": "1", "mode": "strict", "blocked_domains": ["*.adserver.com"]});
        let (d, s) = signed(&doc);
        let vp = validator().validate(&d, &s, ORIGIN).await.unwrap();
        assert_eq!(vp.origin(), ORIGIN);
        assert!(vp.blocked().is_blocked("x.adserver.com"));
        assert!(vp.is_same_source(&d, &s));
        assert!(!vp.is_same_source(&d, "other"));
    }

    #[tokio::test]
    async fn signature_covers_document_as_sent_not_as_coerced() {
        // Defaults are filled in by the schema, but the signature is over the raw document.
        let doc = json!({"version": "1", "mode": "relaxed"});
        let (d, s) = signed(&doc);
        let vp = validator().validate(&d, &s, ORIGIN).await.unwrap();
        assert_eq!(vp.policy().allow_iframes, vec!["self".to_string()]);
    }

    #[tokio::test]
    async fn key_order_in_header_does_not_matter() {
        let doc = json!({"version": "1", "mode": "strict"});
        let s = sign_policy_document(&key(), &doc);
        let reordered = r#"{ "mode": "strict", "version": "1" }"#;
        assert!(validator().validate(reordered, &s, ORIGIN).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected_even_with_valid_signature() {
        let doc = json!({"version": "1", "mode": "unknown"});
        let (d, s) = signed(&doc);
        let err = validator().validate(&d, &s, ORIGIN).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "schema_error");
    }

    #[tokio::test]
    async fn missing_key_is_key_fetch_error() {
        let doc = json!({"version": "1", "mode": "strict"});
        let (d, s) = signed(&doc);
        let err = validator().validate(&d, &s, "https://other.example.org").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "key_fetch_error");
    }

    #[tokio::test]
    async fn tampered_document_is_signature_error() {
        let doc = json!({"version": "1", "mode": "strict", "blocked_domains": ["ads.example.com"]});
        let s = sign_policy_document(&key(), &doc);
        let tampered = json!({"version": "1", "mode": "strict", "blocked_domains": []}).to_string();
        let err = validator().validate(&tampered, &s, ORIGIN).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "signature_error");
    }

    #[tokio::test]
    async fn invalid_json_is_schema_error() {
        let err = validator().validate("{not json", "AAAA", ORIGIN).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "schema_error");
    }
}
