//! Canonical form vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use adfree_core::policy::{canonicalize, canonicalize_serializable};
use serde_json::{json, Value};

use vector_loader::CanonicalVector;

#[test]
fn canonical_vectors() {
    let vectors: Vec<CanonicalVector> = vector_loader::load("canonical.json");
    assert!(!vectors.is_empty());

    for v in vectors {
        let value: Value = serde_json::from_str(&v.input).unwrap();
        let out = canonicalize(&value);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            v.expect,
            "vector={}",
            v.description
        );
    }
}

#[test]
fn insertion_order_does_not_matter() {
    let mut a = serde_json::Map::new();
    a.insert("b".into(), json!(2));
    a.insert("a".into(), json!({"d": 4, "c": 3}));

    let mut b = serde_json::Map::new();
    b.insert("a".into(), json!({"c": 3, "d": 4}));
    b.insert("b".into(), json!(2));

    let ca = canonicalize(&Value::Object(a));
    let cb = canonicalize(&Value::Object(b));
    assert_eq!(ca, cb);
    assert_eq!(ca, br#"{"a":{"c":3,"d":4},"b":2}"#.to_vec());
}

#[test]
fn repeated_calls_are_byte_identical() {
    let doc = json!({"mode": "strict", "blocked_domains": ["x.com", "*.y.com"], "version": "1"});
    assert_eq!(canonicalize(&doc), canonicalize(&doc));
}

#[test]
fn serializable_structs_canonicalize() {
    #[derive(serde::Serialize)]
    struct Doc {
        zeta: u8,
        alpha: &'static str,
    }
    let out = canonicalize_serializable(&Doc { zeta: 1, alpha: "a" }).unwrap();
    assert_eq!(out, br#"{"alpha":"a","zeta":1}"#.to_vec());
}

#[test]
fn non_string_map_keys_are_a_programming_error() {
    let mut m = std::collections::HashMap::new();
    m.insert(vec![1u8], 1u8);
    let err = canonicalize_serializable(&m).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "internal_error");
}
