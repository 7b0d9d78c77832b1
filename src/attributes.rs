//! Subject identity and attributes passed into evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::TypedValue;
use crate::Str;

/// Key-value pairs describing a subject, used by targeting conditions.
///
/// # Examples
/// ```
/// # use flagcore::{Attributes, TypedValue};
/// let attributes: Attributes = [
///     ("age".to_owned(), TypedValue::Numeric(30.0)),
///     ("is_premium_member".to_owned(), TypedValue::Bool(true)),
///     ("username".to_owned(), TypedValue::from("john_doe")),
/// ]
/// .into_iter()
/// .collect();
/// ```
pub type Attributes = HashMap<String, TypedValue>;

/// Identifies the entity being evaluated: a stable key (used for bucketing) plus whatever
/// attributes the caller wants to target on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    /// The stable identifier used as sharding input (e.g. a user id or device id).
    pub subject_key: Str,
    /// Attributes evaluated against targeting conditions.
    #[serde(default)]
    pub subject_attributes: Attributes,
}

impl Subject {
    /// Creates a subject with no attributes.
    pub fn new(subject_key: impl Into<Str>) -> Self {
        Self {
            subject_key: subject_key.into(),
            subject_attributes: Attributes::new(),
        }
    }

    /// Creates a subject with the given attributes.
    pub fn with_attributes(subject_key: impl Into<Str>, subject_attributes: Attributes) -> Self {
        Self {
            subject_key: subject_key.into(),
            subject_attributes,
        }
    }

    /// Looks up a single attribute by name. Missing attributes and attributes explicitly set to
    /// `Null` both evaluate the same way under `IS_NULL`.
    pub fn attribute(&self, name: &str) -> Option<&TypedValue> {
        self.subject_attributes.get(name)
    }
}
