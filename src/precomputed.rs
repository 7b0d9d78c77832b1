//! Client-side consumption of a server-precomputed flag payload (C9).
//!
//! A precomputed configuration already carries one resolved variation per flag for a specific
//! subject; evaluation collapses to an O(1) lookup instead of walking rules/allocations/splits.
//! Unlike the main [`crate::config::Configuration`], decoding here is keyed off `variation_type`
//! rather than a blanket "everything is base64": numeric and boolean payloads are carried
//! directly on the wire, only string-bearing payloads (`String`, `Json`) are base64-encoded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::config::WireValue;
use crate::error::EvaluationError;
use crate::obfuscation;
use crate::value::{AssignedValue, VariationType};

/// A fully resolved configuration for exactly one subject, as produced by a server that did the
/// rule/allocation/split evaluation ahead of time.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputedConfiguration {
    /// Salt mixed into the flag-key hash used as the map key in `flags`.
    #[serde_as(as = "Base64")]
    pub salt: Vec<u8>,
    /// When this payload was computed by the server.
    pub fetched_at: DateTime<Utc>,
    /// When the underlying configuration it was computed from was published, if known.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Flags keyed by `md5_hex(flag_key + salt_plain)`.
    pub flags: HashMap<String, PrecomputedFlag>,
}

/// A single flag's precomputed outcome.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputedFlag {
    /// Base64-encoded allocation key, present when `do_log` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_key: Option<String>,
    /// Base64-encoded variation key, present when `do_log` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_key: Option<String>,
    /// Type the resolved value should be interpreted as.
    pub variation_type: VariationType,
    /// The resolved value: direct for `Boolean`/`Integer`/`Numeric`, base64-encoded for
    /// `String`/`Json`.
    pub variation_value: WireValue,
    /// Extra fields to copy into the assignment-log event; base64-encoded keys and values.
    #[serde(default)]
    pub extra_logging: HashMap<String, String>,
    /// Whether an assignment event should be logged for this flag.
    pub do_log: bool,
}

/// The outcome of looking up a precomputed flag: the typed value plus whatever's needed to log
/// an assignment event, if `do_log` was set.
#[derive(Debug, Clone)]
pub struct PrecomputedAssignment {
    /// The resolved, typed variation value.
    pub value: AssignedValue,
    /// Decoded allocation key, present iff the flag wants logging.
    pub allocation_key: Option<String>,
    /// Decoded variation key, present iff the flag wants logging.
    pub variation_key: Option<String>,
    /// Decoded extra-logging map, present iff the flag wants logging.
    pub extra_logging: HashMap<String, String>,
    /// Whether this outcome should be logged.
    pub do_log: bool,
}

impl PrecomputedConfiguration {
    /// Looks up `flag_key`'s precomputed outcome, decoding its value as `expected_type`.
    ///
    /// Returns `Ok(None)` for "use the default" outcomes (missing flag, type mismatch, or a
    /// malformed base64 payload) — none of these are hard errors, they're all paths the caller's
    /// default value absorbs.
    pub(crate) fn lookup(
        &self,
        flag_key: &str,
        expected_type: VariationType,
    ) -> Result<Option<PrecomputedAssignment>, EvaluationError> {
        let salt_plain = self.salt.clone();
        let mut hasher = md5::Context::new();
        hasher.consume(flag_key.as_bytes());
        hasher.consume(&salt_plain);
        let key = format!("{:x}", hasher.compute());

        let Some(flag) = self.flags.get(&key) else {
            return Ok(None);
        };

        if flag.variation_type != expected_type {
            return Ok(None);
        }

        let Some(value) = decode_precomputed_value(&flag.variation_value, expected_type) else {
            return Ok(None);
        };

        if !flag.do_log {
            return Ok(Some(PrecomputedAssignment {
                value,
                allocation_key: None,
                variation_key: None,
                extra_logging: HashMap::new(),
                do_log: false,
            }));
        }

        let allocation_key = flag
            .allocation_key
            .as_deref()
            .map(obfuscation::decode_value)
            .transpose()
            .map_err(|_| EvaluationError::BadBase64)?;
        let variation_key = flag
            .variation_key
            .as_deref()
            .map(obfuscation::decode_value)
            .transpose()
            .map_err(|_| EvaluationError::BadBase64)?;

        let mut extra_logging = HashMap::with_capacity(flag.extra_logging.len());
        for (k, v) in &flag.extra_logging {
            let key = obfuscation::decode_value(k).map_err(|_| EvaluationError::BadBase64)?;
            let value = obfuscation::decode_value(v).map_err(|_| EvaluationError::BadBase64)?;
            extra_logging.insert(key, value);
        }

        Ok(Some(PrecomputedAssignment {
            value,
            allocation_key,
            variation_key,
            extra_logging,
            do_log: true,
        }))
    }
}

fn decode_precomputed_value(raw: &WireValue, ty: VariationType) -> Option<AssignedValue> {
    match ty {
        VariationType::Boolean => match raw {
            WireValue::Boolean(b) => Some(AssignedValue::Boolean(*b)),
            _ => None,
        },
        VariationType::Integer => match raw {
            WireValue::Number(n) => {
                let i = *n as i64;
                (i as f64 == *n).then_some(AssignedValue::Integer(i))
            }
            _ => None,
        },
        VariationType::Numeric => match raw {
            WireValue::Number(n) => Some(AssignedValue::Numeric(*n)),
            _ => None,
        },
        VariationType::String => {
            let WireValue::String(encoded) = raw else {
                return None;
            };
            obfuscation::decode_value(encoded)
                .ok()
                .map(|s| AssignedValue::String(s.into()))
        }
        VariationType::Json => {
            let WireValue::String(encoded) = raw else {
                return None;
            };
            let decoded = obfuscation::decode_value(encoded).ok()?;
            serde_json::from_str(&decoded).ok().map(AssignedValue::Json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(flag_key: &str, flag: PrecomputedFlag, salt: &[u8]) -> PrecomputedConfiguration {
        let mut hasher = md5::Context::new();
        hasher.consume(flag_key.as_bytes());
        hasher.consume(salt);
        let hashed_key = format!("{:x}", hasher.compute());

        let mut flags = HashMap::new();
        flags.insert(hashed_key, flag);

        PrecomputedConfiguration {
            salt: salt.to_vec(),
            fetched_at: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            published_at: None,
            flags,
        }
    }

    #[test]
    fn numeric_and_boolean_are_carried_directly() {
        let salt_plain = b"sodiumchloride".to_vec();
        let config = config_with(
            "bool-flag",
            PrecomputedFlag {
                allocation_key: None,
                variation_key: None,
                variation_type: VariationType::Boolean,
                variation_value: WireValue::Boolean(true),
                extra_logging: HashMap::new(),
                do_log: false,
            },
            &salt_plain,
        );

        let result = config
            .lookup("bool-flag", VariationType::Boolean)
            .unwrap()
            .unwrap();
        assert_eq!(result.value, AssignedValue::Boolean(true));
    }

    #[test]
    fn string_values_are_base64_decoded() {
        let salt_plain = b"sodiumchloride".to_vec();
        let encoded = obfuscation::encode_value("hello, world!");
        let config = config_with(
            "string-flag",
            PrecomputedFlag {
                allocation_key: Some(obfuscation::encode_value("allocation-key")),
                variation_key: Some(obfuscation::encode_value("variation-key")),
                variation_type: VariationType::String,
                variation_value: WireValue::String(encoded),
                extra_logging: HashMap::new(),
                do_log: true,
            },
            &salt_plain,
        );

        let result = config
            .lookup("string-flag", VariationType::String)
            .unwrap()
            .unwrap();
        assert_eq!(
            result.value,
            AssignedValue::String("hello, world!".into())
        );
        assert_eq!(result.allocation_key.as_deref(), Some("allocation-key"));
    }

    #[test]
    fn known_flag_key_hash_vector() {
        let salt_b64 = "c29kaXVtY2hsb3JpZGU=";
        assert_eq!(obfuscation::encode_value("sodiumchloride"), salt_b64);

        let mut hasher = md5::Context::new();
        hasher.consume(b"string-flag");
        hasher.consume(b"sodiumchloride");
        assert_eq!(
            format!("{:x}", hasher.compute()),
            "41a27b85ebdd7b1a5ae367a1a240a214"
        );
    }

    #[test]
    fn missing_flag_yields_none() {
        let config = config_with(
            "other-flag",
            PrecomputedFlag {
                allocation_key: None,
                variation_key: None,
                variation_type: VariationType::Boolean,
                variation_value: WireValue::Boolean(true),
                extra_logging: HashMap::new(),
                do_log: false,
            },
            b"salt",
        );
        assert!(config.lookup("missing-flag", VariationType::Boolean).unwrap().is_none());
    }

    #[test]
    fn type_mismatch_yields_none() {
        let config = config_with(
            "flag",
            PrecomputedFlag {
                allocation_key: None,
                variation_key: None,
                variation_type: VariationType::Boolean,
                variation_value: WireValue::Boolean(true),
                extra_logging: HashMap::new(),
                do_log: false,
            },
            b"salt",
        );
        assert!(config.lookup("flag", VariationType::String).unwrap().is_none());
    }
}
