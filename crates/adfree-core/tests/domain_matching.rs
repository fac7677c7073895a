//! Domain pattern and embed host extraction tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use adfree_core::policy::{host_of, BlockList, DomainPattern};

fn list(raw: &[&str]) -> BlockList {
    let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
    BlockList::compile(&raw).unwrap()
}

#[test]
fn wildcard_is_suffix_only() {
    let l = list(&["*.adserver.com"]);
    assert!(l.is_blocked("ads.adserver.com"));
    assert!(l.is_blocked("x.y.adserver.com"));
    assert!(!l.is_blocked("adserver.com"));
    assert!(!l.is_blocked("notadserver.com"));
    assert!(!l.is_blocked("adserver.com.evil.net"));
}

#[test]
fn bare_domain_must_be_listed_explicitly() {
    let l = list(&["*.adserver.com", "adserver.com"]);
    assert!(l.is_blocked("adserver.com"));
    assert!(l.is_blocked("a.adserver.com"));
}

#[test]
fn exact_match_is_case_insensitive() {
    let l = list(&["Ads.Example.com"]);
    assert!(l.is_blocked("ads.example.com"));
    assert!(l.is_blocked("ADS.EXAMPLE.COM."));
    assert!(!l.is_blocked("sub.ads.example.com"));
}

#[test]
fn find_reports_matching_pattern() {
    let l = list(&["tracker.net", "*.adserver.com"]);
    assert_eq!(
        l.find("a.adserver.com"),
        Some(&DomainPattern::Suffix(".adserver.com".into()))
    );
    assert_eq!(l.find("a.adserver.com").unwrap().as_pattern(), "*.adserver.com");
}

#[test]
fn invalid_patterns_are_schema_errors() {
    for bad in ["", "*.", "*", "ads.*.com", "a..com", "bad host.com"] {
        let err = DomainPattern::parse(bad).expect_err(bad);
        assert_eq!(err.kind().as_str(), "schema_error", "pattern={bad:?}");
    }
}

#[test]
fn host_extraction() {
    assert_eq!(host_of("https://ads.example.com/x?y=1").as_deref(), Some("ads.example.com"));
    assert_eq!(host_of("HTTP://Ads.Example.com:8080/").as_deref(), Some("ads.example.com"));
    assert_eq!(host_of("//cdn.adserver.com/frame").as_deref(), Some("cdn.adserver.com"));
    assert_eq!(host_of("https://user:pw@ads.example.com/").as_deref(), Some("ads.example.com"));
    assert_eq!(host_of("https://[::1]:9000/x").as_deref(), Some("[::1]"));
    assert_eq!(host_of("/relative/frame.html"), None);
    assert_eq!(host_of("frame.html"), None);
    assert_eq!(host_of("data:text/html,hi"), None);
    assert_eq!(host_of("javascript:void(0)"), None);
    assert_eq!(host_of("https:///nohost"), None);
}
