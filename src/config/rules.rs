//! Targeting rule and condition evaluation (C5/C6).
//!
//! Subject attributes passed into `assign*` are always plaintext, even against an obfuscated
//! configuration — only the configuration itself (keys, operand literals) is obfuscated. So the
//! attribute side of a comparison never needs decoding; only `condition.value` does.

use regex::Regex;
use semver::Version;

use super::models::{ConditionValue, OperatorType, TargetingCondition, TargetingRule, WireValue};
use crate::obfuscation;
use crate::value::TypedValue;
use crate::Attributes;

impl TargetingRule {
    pub(crate) fn eval(&self, attributes: &Attributes, obfuscated: bool) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(attributes, obfuscated))
    }
}

impl TargetingCondition {
    fn eval(&self, attributes: &Attributes, obfuscated: bool) -> bool {
        self.operator
            .eval(attributes.get(&self.attribute), &self.value, obfuscated)
    }
}

/// Decodes a scalar operand if the configuration is obfuscated; returns the stringified literal
/// unchanged otherwise.
fn operand_string(value: &WireValue, obfuscated: bool) -> Option<String> {
    if obfuscated {
        let WireValue::String(encoded) = value else {
            return None;
        };
        obfuscation::decode_value(encoded).ok()
    } else {
        Some(value.stringify())
    }
}

impl OperatorType {
    /// Applies the operator, returning `false` if it cannot be applied (misconfiguration, type
    /// mismatch, undecodable operand) rather than propagating an error — every condition failure
    /// is "this rule doesn't match," never a hard evaluation error.
    fn eval(
        &self,
        attribute: Option<&TypedValue>,
        condition_value: &ConditionValue,
        obfuscated: bool,
    ) -> bool {
        self.try_eval(attribute, condition_value, obfuscated)
            .unwrap_or(false)
    }

    fn try_eval(
        &self,
        attribute: Option<&TypedValue>,
        condition_value: &ConditionValue,
        obfuscated: bool,
    ) -> Option<bool> {
        match self {
            Self::Matches | Self::NotMatches => {
                let s = match attribute {
                    Some(TypedValue::String(s)) => s,
                    _ => return None,
                };

                if obfuscated {
                    if matches!(self, Self::NotMatches) {
                        // Degrades to equality under obfuscation; negating an equality-only
                        // match is not a faithful regex negation, so this is unsupported.
                        return Some(false);
                    }
                    let ConditionValue::Single(WireValue::String(hashed)) = condition_value
                    else {
                        return None;
                    };
                    log::debug!(target: "flagcore", "MATCHES operand is obfuscated; degrading to hash equality");
                    Some(&obfuscation::hash_string_operand(s) == hashed)
                } else {
                    let ConditionValue::Single(WireValue::String(pattern)) = condition_value
                    else {
                        return None;
                    };
                    let regex = Regex::new(pattern).ok()?;
                    let matches = regex.is_match(s);
                    Some(if matches!(self, Self::Matches) {
                        matches
                    } else {
                        !matches
                    })
                }
            }

            Self::OneOf | Self::NotOneOf => {
                let s = attribute.and_then(TypedValue::as_comparison_string);
                let Some(s) = s else {
                    // Absent/unrepresentable attribute: OneOf fails, NotOneOf also fails (it is
                    // not "not a member" of anything when there's nothing to check).
                    return Some(false);
                };
                let ConditionValue::Multiple(values) = condition_value else {
                    return None;
                };

                let is_member = if obfuscated {
                    let hashed = obfuscation::hash_string_operand(&s);
                    values.iter().any(|v| v == &hashed)
                } else {
                    values.iter().any(|v| v == &s)
                };

                let want_member = matches!(self, Self::OneOf);
                Some(is_member == want_member)
            }

            Self::IsNull => {
                let is_null = attribute.is_none() || matches!(attribute, Some(TypedValue::Null));
                let ConditionValue::Single(raw) = condition_value else {
                    return None;
                };
                let expected_str = operand_string(raw, obfuscated)?;
                let expected_null: bool = expected_str.parse().ok()?;
                Some(is_null == expected_null)
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let ConditionValue::Single(raw) = condition_value else {
                    return None;
                };
                let operand_str = operand_string(raw, obfuscated)?;

                if let Ok(condition_version) = Version::parse(&operand_str) {
                    let attribute_version = match attribute {
                        Some(TypedValue::String(s)) => Version::parse(s).ok()?,
                        _ => return None,
                    };
                    Some(self.compare(attribute_version, condition_version))
                } else {
                    let condition_num: f64 = operand_str.parse().ok()?;
                    let attribute_num = match attribute {
                        Some(TypedValue::Numeric(n)) => *n,
                        Some(TypedValue::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };
                    Some(self.compare(attribute_num, condition_num))
                }
            }
        }
    }

    fn compare<T: PartialOrd>(&self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
            _ => unreachable!("compare is only called for ordering operators"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn attrs(pairs: impl IntoIterator<Item = (&'static str, TypedValue)>) -> Attributes {
        pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn matches_regex_plaintext() {
        let op = OperatorType::Matches;
        let value = ConditionValue::from("^test.*");
        assert!(op.eval(Some(&TypedValue::from("test@example.com")), &value, false));
        assert!(!op.eval(Some(&TypedValue::from("example@test.com")), &value, false));
    }

    #[test]
    fn not_matches_plaintext() {
        let op = OperatorType::NotMatches;
        let value = ConditionValue::from("^test.*");
        assert!(!op.eval(Some(&TypedValue::from("test@example.com")), &value, false));
        assert!(!op.eval(None, &value, false));
        assert!(op.eval(Some(&TypedValue::from("example@test.com")), &value, false));
    }

    #[test]
    fn not_matches_is_always_false_under_obfuscation() {
        let op = OperatorType::NotMatches;
        let hashed = obfuscation::hash_string_operand("ignored-pattern");
        let value = ConditionValue::Single(WireValue::String(hashed));
        assert!(!op.eval(Some(&TypedValue::from("anything")), &value, true));
    }

    #[test]
    fn matches_is_equality_under_obfuscation() {
        let op = OperatorType::Matches;
        let hashed = obfuscation::hash_string_operand("test@example.com");
        let value = ConditionValue::Single(WireValue::String(hashed));
        assert!(op.eval(Some(&TypedValue::from("test@example.com")), &value, true));
        assert!(!op.eval(Some(&TypedValue::from("other@example.com")), &value, true));
    }

    #[test]
    fn one_of_and_not_one_of() {
        let value = ConditionValue::from(vec!["alice".to_owned(), "bob".to_owned()]);
        assert!(OperatorType::OneOf.eval(Some(&TypedValue::from("alice")), &value, false));
        assert!(!OperatorType::OneOf.eval(Some(&TypedValue::from("charlie")), &value, false));
        assert!(!OperatorType::NotOneOf.eval(Some(&TypedValue::from("alice")), &value, false));
        assert!(OperatorType::NotOneOf.eval(Some(&TypedValue::from("charlie")), &value, false));
        assert!(!OperatorType::NotOneOf.eval(None, &value, false));
    }

    #[test]
    fn one_of_coerces_numeric_and_boolean() {
        assert!(OperatorType::OneOf.eval(
            Some(&TypedValue::Numeric(42.0)),
            &ConditionValue::from(vec!["42".to_owned()]),
            false
        ));
        assert!(OperatorType::OneOf.eval(
            Some(&TypedValue::Bool(true)),
            &ConditionValue::from(vec!["true".to_owned()]),
            false
        ));
    }

    #[test]
    fn is_null_treats_absent_and_null_the_same() {
        assert!(OperatorType::IsNull.eval(None, &ConditionValue::from(true), false));
        assert!(OperatorType::IsNull.eval(Some(&TypedValue::Null), &ConditionValue::from(true), false));
        assert!(!OperatorType::IsNull.eval(
            Some(&TypedValue::Numeric(10.0)),
            &ConditionValue::from(true),
            false
        ));
    }

    #[test]
    fn numeric_comparisons() {
        let gt = OperatorType::Gt;
        assert!(gt.eval(Some(&TypedValue::Numeric(19.0)), &ConditionValue::from(18.0), false));
        assert!(!gt.eval(Some(&TypedValue::Numeric(18.0)), &ConditionValue::from(18.0), false));
    }

    #[test]
    fn semver_comparisons() {
        let gte = OperatorType::Gte;
        assert!(gte.eval(
            Some(&TypedValue::from("1.0.1")),
            &ConditionValue::from("1.0.0"),
            false
        ));
        assert!(!gte.eval(
            Some(&TypedValue::from("1.2.0")),
            &ConditionValue::from("1.10.0"),
            false
        ));
    }

    #[test]
    fn rule_requires_all_conditions() {
        let rule = TargetingRule {
            conditions: vec![
                TargetingCondition {
                    operator: OperatorType::Gt,
                    attribute: "age".into(),
                    value: ConditionValue::from(18.0),
                },
                TargetingCondition {
                    operator: OperatorType::Lt,
                    attribute: "age".into(),
                    value: ConditionValue::from(100.0),
                },
            ],
        };
        assert!(rule.eval(&attrs([("age", TypedValue::Numeric(20.0))]), false));
        assert!(!rule.eval(&attrs([("age", TypedValue::Numeric(17.0))]), false));
    }

    #[test]
    fn empty_rule_matches_everything() {
        let rule = TargetingRule { conditions: vec![] };
        assert!(rule.eval(&HashMap::new(), false));
    }

    #[test]
    fn gt_obfuscated_operand_is_decoded_before_comparison() {
        let encoded = obfuscation::encode_numeric_operand(18.0);
        let value = ConditionValue::Single(WireValue::String(encoded));
        assert!(OperatorType::Gt.eval(Some(&TypedValue::Numeric(19.0)), &value, true));
    }
}
