//! Canonical JSON encoding and SHA-256 digests.
//!
//! The canonical form is the byte string every integrity hash in the ingestion
//! pipeline is computed over:
//! - object keys are sorted lexicographically at every depth
//! - no insignificant whitespace
//! - `null` is written explicitly (absent optional fields are normalized to it
//!   by the callers before encoding)
//! - floats with no fractional part are written as integers, so `10` and
//!   `10.0` hash identically

use serde::Serialize;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Largest magnitude at which an integral `f64` is still exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Encode an already-built JSON value in canonical form.
pub fn encode_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Serialize `value` and encode the result in canonical form.
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(encode_value(&value))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(bytes.as_ref()))
}

/// SHA-256 of the canonical encoding of `value`.
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(to_canonical_json(value)?))
}

/// SHA-256 of the canonical encoding of an already-built JSON value.
pub fn value_digest(value: &Value) -> String {
    sha256_hex(encode_value(value))
}

/// Whether `candidate` looks like a lowercase hex SHA-256 digest.
pub fn is_sha256_hex(candidate: &str) -> bool {
    candidate.len() == 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => write_number(number, out),
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn write_number(number: &Number, out: &mut String) {
    if let Some(float) = number.as_f64().filter(|_| number.is_f64())
        && float.fract() == 0.0
        && float.abs() <= MAX_SAFE_INTEGER
    {
        let _ = write!(out, "{}", float as i64);
        return;
    }
    let _ = write!(out, "{number}");
}

fn write_string(text: &str, out: &mut String) {
    // Value's Display performs JSON string escaping.
    let _ = write!(out, "{}", Value::String(text.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": true, "m": null}, "c": [ {"y": 1, "x": 2} ]});
        assert_eq!(
            encode_value(&value),
            r#"{"a":{"m":null,"z":true},"b":1,"c":[{"x":2,"y":1}]}"#
        );
    }

    #[test]
    fn test_integral_floats_encode_as_integers() {
        assert_eq!(encode_value(&json!(10.0)), "10");
        assert_eq!(encode_value(&json!(10)), "10");
        assert_eq!(encode_value(&json!(0.25)), "0.25");
        assert_eq!(encode_value(&json!(-3.0)), "-3");
    }

    #[test]
    fn test_strings_are_escaped() {
        assert_eq!(encode_value(&json!("a\"b\n")), r#""a\"b\n""#);
    }

    #[test]
    fn test_field_order_does_not_change_digest() {
        let left = json!({"tenant": "t", "repo": "r"});
        let right = json!({"repo": "r", "tenant": "t"});
        assert_eq!(value_digest(&left), value_digest(&right));
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&sha256_hex("x")));
        assert!(!is_sha256_hex("ABC"));
        assert!(!is_sha256_hex(&sha256_hex("x").to_uppercase()));
        assert!(!is_sha256_hex(&format!("{}0", sha256_hex("x"))));
    }
}
