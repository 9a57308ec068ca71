//! JSON canonicalization for deterministic ledger payloads.
//!
//! Every payload is reduced to a canonical textual form before it enters an
//! event's hash preimage, so that two semantically identical payloads always
//! produce the same digest regardless of the key order or formatting they
//! arrived with.
//!
//! # Canonicalization Rules
//!
//! 1. All object keys are sorted lexicographically (byte order)
//! 2. Compact separators, no whitespace
//! 3. Control characters in strings are escaped as JSON requires
//! 4. Null is represented as `null`
//!
//! # Recursion Limit
//!
//! To prevent stack overflow from deeply nested input, a maximum recursion
//! depth of 128 levels is enforced.
//!
//! # Example
//!
//! ```
//! use praxis_core::canonical::canonical_json;
//! use serde_json::json;
//!
//! let a = canonical_json(&json!({"zebra": 1, "apple": 2})).unwrap();
//! let b = canonical_json(&json!({"apple": 2, "zebra": 1})).unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a, r#"{"apple":2,"zebra":1}"#);
//! ```

use std::fmt::Write;

use serde_json::Value;
use thiserror::Error;

/// Maximum recursion depth for canonicalization to prevent stack overflow.
const MAX_DEPTH: usize = 128;

/// Errors that can occur during JSON canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalizeError {
    /// The recursion depth limit was exceeded.
    ///
    /// Returned when the payload is nested deeper than the maximum allowed
    /// depth. The limit exists so adversarially crafted payloads cannot
    /// overflow the stack of the ledger writer.
    #[error("recursion limit exceeded: payload nested deeper than {max_depth} levels")]
    RecursionLimitExceeded {
        /// The maximum depth that was exceeded.
        max_depth: usize,
    },
}

/// Produces the canonical textual form of a JSON value.
///
/// # Errors
///
/// Returns [`CanonicalizeError::RecursionLimitExceeded`] if the value nests
/// deeper than 128 levels.
pub fn canonical_json(value: &Value) -> Result<String, CanonicalizeError> {
    let mut out = String::new();
    write_value(&mut out, value, 0)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> Result<(), CanonicalizeError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalizeError::RecursionLimitExceeded {
            max_depth: MAX_DEPTH,
        });
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            // serde_json's Display for Number matches its serialization.
            let _ = write!(out, "{n}");
        },
        Value::String(s) => write_escaped(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(']');
        },
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()], depth + 1)?;
            }
            out.push('}');
        },
    }

    Ok(())
}

/// Writes a JSON string literal with the escapes the grammar requires.
fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod unit_tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_keys_sorted() {
        let value = json!({"b": 1, "a": {"z": true, "m": null}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"m":null,"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_key_order_irrelevant() {
        let a = json!({"x": [1, 2, 3], "y": "text"});
        let b = json!({"y": "text", "x": [1, 2, 3]});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_string_escapes() {
        let value = json!({"note": "line1\nline2\t\"quoted\"\u{01}"});
        assert_eq!(
            canonical_json(&value).unwrap(),
            "{\"note\":\"line1\\nline2\\t\\\"quoted\\\"\\u0001\"}"
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(canonical_json(&json!(null)).unwrap(), "null");
        assert_eq!(canonical_json(&json!(true)).unwrap(), "true");
        assert_eq!(canonical_json(&json!(42)).unwrap(), "42");
        assert_eq!(canonical_json(&json!(-1.5)).unwrap(), "-1.5");
        assert_eq!(canonical_json(&json!("s")).unwrap(), "\"s\"");
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!(1);
        for _ in 0..200 {
            value = json!([value]);
        }
        assert!(matches!(
            canonical_json(&value),
            Err(CanonicalizeError::RecursionLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_matches_serde_for_simple_payloads() {
        // Canonical output must stay valid JSON that parses back to the
        // same value.
        let value = json!({"from_state": "APPLIED", "to_state": "SHORTLISTED", "rank": 3});
        let canonical = canonical_json(&value).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&canonical).unwrap();
        assert_eq!(reparsed, value);
    }
}
