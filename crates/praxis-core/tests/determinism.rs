//! Determinism properties for payload canonicalization and event hashing.

use proptest::prelude::*;
use serde_json::Value;

use praxis_core::canonical::canonical_json;
use praxis_core::crypto::EventHasher;

/// Arbitrary JSON values, bounded in depth and width.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        "[a-zA-Z0-9 _.\\-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Canonical output is valid JSON that parses back to the same value.
    #[test]
    fn canonical_json_round_trips(value in arb_json()) {
        let canonical = canonical_json(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&canonical).unwrap();
        prop_assert_eq!(&reparsed, &value);
    }

    /// Formatting noise never changes the canonical form: pretty-printing a
    /// value and reparsing it canonicalizes to the identical string, so the
    /// event digest is independent of how a payload was serialized in
    /// transit.
    #[test]
    fn canonical_json_ignores_formatting(value in arb_json()) {
        let canonical = canonical_json(&value).unwrap();

        let pretty = serde_json::to_string_pretty(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&pretty).unwrap();
        prop_assert_eq!(canonical_json(&reparsed).unwrap(), canonical.clone());

        prop_assert_eq!(
            EventHasher::digest(canonical.as_bytes()),
            EventHasher::digest(canonical_json(&reparsed).unwrap().as_bytes())
        );
    }

    /// Distinct preimages produce distinct digests (no accidental
    /// truncation of the preimage).
    #[test]
    fn digest_depends_on_payload(a in arb_json(), b in arb_json()) {
        let ca = canonical_json(&a).unwrap();
        let cb = canonical_json(&b).unwrap();
        if ca != cb {
            prop_assert_ne!(
                EventHasher::digest(ca.as_bytes()),
                EventHasher::digest(cb.as_bytes())
            );
        }
    }
}
