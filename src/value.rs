//! The typed value model shared by subject attributes, condition operands, and variation values.

use std::collections::HashSet;

use derive_more::From;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{error::EvaluationError, ArcStr};

/// A single dynamically-typed value.
///
/// `TypedValue` is deliberately a closed tagged variant rather than leaning on host dynamic
/// typing: a subject attribute, a condition operand, and a resolved variation value are all the
/// same type, and every accessor below fails loudly (with [`EvaluationError::ValueNotSet`])
/// instead of silently coercing.
#[derive(Debug, Clone, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum TypedValue {
    /// Absence of a value. An attribute that was never supplied and an attribute explicitly set
    /// to `null` are both represented this way (see `IS_NULL` semantics).
    Null,
    /// A boolean value.
    Bool(bool),
    /// A numeric value. Used for both `INTEGER` and `NUMERIC` variation types; the distinction
    /// is only made by the caller-facing accessor.
    Numeric(f64),
    /// A string value.
    String(String),
    /// An ordered collection of strings, used for `ONE_OF`/`NOT_ONE_OF` operands. Equality and
    /// the fingerprint helper both treat this as a set: order and duplicates are ignored.
    StringSet(Vec<String>),
}

impl TypedValue {
    /// `true` if this is [`TypedValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Returns the boolean payload, or [`EvaluationError::ValueNotSet`] if this isn't a `Bool`.
    pub fn get_bool(&self) -> Result<bool, EvaluationError> {
        match self {
            TypedValue::Bool(b) => Ok(*b),
            _ => Err(EvaluationError::ValueNotSet),
        }
    }

    /// Returns the numeric payload, or [`EvaluationError::ValueNotSet`] if this isn't `Numeric`.
    pub fn get_numeric(&self) -> Result<f64, EvaluationError> {
        match self {
            TypedValue::Numeric(n) => Ok(*n),
            _ => Err(EvaluationError::ValueNotSet),
        }
    }

    /// Truncates a `Numeric` payload to an integer via double-to-int conversion. Fails if the
    /// value isn't numeric or doesn't round-trip through `i64` (e.g. it has a fractional part).
    pub fn get_integer(&self) -> Result<i64, EvaluationError> {
        let n = self.get_numeric()?;
        let i = n as i64;
        if i as f64 == n {
            Ok(i)
        } else {
            Err(EvaluationError::ValueNotSet)
        }
    }

    /// Returns the string payload, or [`EvaluationError::ValueNotSet`] if this isn't a `String`.
    pub fn get_string(&self) -> Result<&str, EvaluationError> {
        match self {
            TypedValue::String(s) => Ok(s.as_str()),
            _ => Err(EvaluationError::ValueNotSet),
        }
    }

    /// Returns the string-set payload, or [`EvaluationError::ValueNotSet`] if this isn't a
    /// `StringSet`.
    pub fn get_string_set(&self) -> Result<&[String], EvaluationError> {
        match self {
            TypedValue::StringSet(s) => Ok(s.as_slice()),
            _ => Err(EvaluationError::ValueNotSet),
        }
    }

    /// Renders this value as a string for comparison purposes (used by `ONE_OF`/`MATCHES`, which
    /// accept numeric and boolean attributes by stringifying them first).
    pub(crate) fn as_comparison_string(&self) -> Option<String> {
        match self {
            TypedValue::String(s) => Some(s.clone()),
            TypedValue::Numeric(n) => Some(format_numeric(*n)),
            TypedValue::Bool(b) => Some(b.to_string()),
            TypedValue::Null | TypedValue::StringSet(_) => None,
        }
    }

    /// A stable SHA-256 hex digest of this value, for use as a logging/fingerprinting identity.
    /// This is unrelated to the MD5 bucketing hash used by the sharder and obfuscation codec.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            TypedValue::Null => hasher.update(b"null"),
            TypedValue::Bool(b) => hasher.update(if *b { b"bool:true" } else { b"bool:false" }),
            TypedValue::Numeric(n) => hasher.update(format!("numeric:{n}").as_bytes()),
            TypedValue::String(s) => hasher.update(format!("string:{s}").as_bytes()),
            TypedValue::StringSet(set) => {
                let mut sorted: Vec<&str> = set.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                sorted.dedup();
                hasher.update(b"stringset:");
                for s in sorted {
                    hasher.update(s.as_bytes());
                    hasher.update(b"\0");
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypedValue::Null, TypedValue::Null) => true,
            (TypedValue::Bool(a), TypedValue::Bool(b)) => a == b,
            (TypedValue::Numeric(a), TypedValue::Numeric(b)) => a == b,
            (TypedValue::String(a), TypedValue::String(b)) => a == b,
            (TypedValue::StringSet(a), TypedValue::StringSet(b)) => {
                let a: HashSet<&str> = a.iter().map(String::as_str).collect();
                let b: HashSet<&str> = b.iter().map(String::as_str).collect();
                a == b
            }
            _ => false,
        }
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_owned())
    }
}

impl From<Vec<&str>> for TypedValue {
    fn from(value: Vec<&str>) -> Self {
        TypedValue::StringSet(value.into_iter().map(str::to_owned).collect())
    }
}

fn format_numeric(n: f64) -> String {
    if n == n.trunc() && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Type of the variation a flag serves.
///
/// `Integer` and `Numeric` share `Numeric` storage in [`TypedValue`] but differ in the
/// caller-facing API (`get_integer_assignment` vs. `get_numeric_assignment`).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariationType {
    /// Boolean flag.
    Boolean,
    /// Integer flag, stored as `Numeric` but truncated on extraction.
    Integer,
    /// Floating-point flag.
    Numeric,
    /// String flag.
    String,
    /// JSON flag; the underlying wire value is a JSON-encoded string.
    Json,
}

/// The final, caller-facing typed result of a flag evaluation. Unlike [`TypedValue`], this
/// distinguishes `Integer` from `Numeric` and carries parsed JSON rather than a raw string.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignedValue {
    /// Resolved boolean variation.
    Boolean(bool),
    /// Resolved integer variation.
    Integer(i64),
    /// Resolved numeric variation.
    Numeric(f64),
    /// Resolved string variation.
    String(ArcStr),
    /// Resolved JSON variation, parsed from the wire's JSON-string representation.
    Json(serde_json::Value),
}

impl AssignedValue {
    /// Returns the variation type this value corresponds to.
    pub fn variation_type(&self) -> VariationType {
        match self {
            AssignedValue::Boolean(_) => VariationType::Boolean,
            AssignedValue::Integer(_) => VariationType::Integer,
            AssignedValue::Numeric(_) => VariationType::Numeric,
            AssignedValue::String(_) => VariationType::String,
            AssignedValue::Json(_) => VariationType::Json,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AssignedValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AssignedValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the numeric payload, if any.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            AssignedValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AssignedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the JSON payload, if any.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            AssignedValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_set_equality_ignores_order_and_duplicates() {
        let a = TypedValue::StringSet(vec!["a".into(), "b".into(), "a".into()]);
        let b = TypedValue::StringSet(vec!["b".into(), "a".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_nan_never_equal() {
        let nan = TypedValue::Numeric(f64::NAN);
        assert_ne!(nan, nan.clone());
    }

    #[test]
    fn fingerprint_is_order_independent_for_string_sets() {
        let a = TypedValue::StringSet(vec!["a".into(), "b".into()]);
        let b = TypedValue::StringSet(vec!["b".into(), "a".into(), "a".into()]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn integer_truncates_and_rejects_fractional() {
        assert_eq!(TypedValue::Numeric(42.0).get_integer(), Ok(42));
        assert!(TypedValue::Numeric(42.5).get_integer().is_err());
    }

    #[test]
    fn accessor_mismatch_is_value_not_set() {
        assert_eq!(
            TypedValue::Bool(true).get_string(),
            Err(EvaluationError::ValueNotSet)
        );
    }
}
