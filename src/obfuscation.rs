//! Codec for the obfuscated wire format.
//!
//! When a configuration is fetched over an untrusted channel, flag/allocation/variation keys and
//! the string operands embedded in targeting rules are hashed or encoded so that the payload
//! does not leak business-readable names or values. This module is the single place that knows
//! the encoding rules; [`crate::config`] decides *when* to apply them via an `obfuscated: bool`
//! flag threaded through evaluation rather than a distinct wrapper type, so the same rule-walking
//! code serves both modes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::EvaluationError;

/// Hashes a flag/allocation/variation/split key into its obfuscated-configuration form.
///
/// This is a plain, unsalted MD5 hex digest: the server and every SDK must agree on it without
/// exchanging a secret, since the only goal is to avoid shipping business-readable names, not to
/// resist a targeted attacker.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", md5::compute(key.as_bytes()))
}

/// Hashes a string operand (used by `ONE_OF`/`NOT_ONE_OF`/`MATCHES` condition values). Unlike
/// [`hash_key`], this lowercases the input first, so that matching is case-insensitive once
/// values are reduced to hashes.
pub fn hash_string_operand(operand: &str) -> String {
    hash_key(&operand.to_lowercase())
}

/// Base64-encodes a string for inclusion in an obfuscated configuration, after stringifying any
/// non-string payload first (booleans as `"true"`/`"false"`, numbers via their default `Display`).
///
/// This is the convention the wire format uses for *variation values*, not the MD5 operand
/// hashing above: values must be recoverable, not just comparable, so they're encoded rather than
/// hashed.
pub fn encode_value(value: &str) -> String {
    BASE64.encode(value.as_bytes())
}

/// Reverses [`encode_value`]. Fails with [`EvaluationError::BadBase64`] if the payload is not
/// valid base64, or not valid UTF-8 once decoded.
pub fn decode_value(encoded: &str) -> Result<String, EvaluationError> {
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| EvaluationError::BadBase64)?;
    String::from_utf8(bytes).map_err(|_| EvaluationError::BadBase64)
}

/// Encodes a numeric comparison operand (`GT`/`GTE`/`LT`/`LTE`) as base64 of its stringified
/// form, matching [`encode_value`]'s convention for non-string payloads.
pub fn encode_numeric_operand(value: f64) -> String {
    encode_value(&value.to_string())
}

/// Decodes a numeric comparison operand produced by [`encode_numeric_operand`].
pub fn decode_numeric_operand(encoded: &str) -> Result<f64, EvaluationError> {
    decode_value(encoded)?
        .parse::<f64>()
        .map_err(|_| EvaluationError::BadBase64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_key_matches_known_vector() {
        assert_eq!(hash_key("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn hash_string_operand_is_case_insensitive() {
        assert_eq!(hash_string_operand("HELLO"), hash_string_operand("hello"));
    }

    #[test]
    fn encode_decode_value_roundtrips() {
        let encoded = encode_value("string-flag");
        assert_eq!(decode_value(&encoded).unwrap(), "string-flag");
    }

    #[test]
    fn known_salt_encoding() {
        assert_eq!(encode_value("sodiumchloride"), "c29kaXVtY2hsb3JpZGU=");
    }

    #[test]
    fn numeric_operand_roundtrips() {
        let encoded = encode_numeric_operand(42.5);
        assert_eq!(decode_numeric_operand(&encoded).unwrap(), 42.5);
    }

    #[test]
    fn decode_value_rejects_invalid_base64() {
        assert_eq!(decode_value("not base64!!"), Err(EvaluationError::BadBase64));
    }
}
