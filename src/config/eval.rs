//! The standard flag evaluator: enabled -> rules -> allocations -> splits -> variation (C7/C8).

use chrono::Utc;

use super::models::{Allocation, Configuration, Flag, Shard, Split, Timestamp, SUBJECT_KEY_ATTRIBUTE};
use crate::error::EvaluationError;
use crate::obfuscation;
use crate::sharder::Md5Sharder;
use crate::value::{AssignedValue, VariationType};
use crate::Attributes;

/// The outcome of a successful flag evaluation: the assigned variation plus enough context to
/// build an assignment-log event, if the matching allocation wants one.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// The resolved, typed variation value.
    pub value: AssignedValue,
    /// Key of the allocation that matched.
    pub allocation_key: String,
    /// Key of the variation that matched.
    pub variation_key: String,
    /// Whether the matching allocation wants an assignment event logged.
    pub do_log: bool,
    /// Extra fields to copy into the assignment-log event, already decoded if the configuration
    /// was obfuscated.
    pub extra_logging: std::collections::HashMap<String, String>,
}

impl Configuration {
    /// Evaluates `flag_key` for `subject_key`/`subject_attributes`, expecting a variation of
    /// `expected_type`. Returns `Ok(None)` if the flag doesn't exist, is disabled, or no
    /// allocation matched — all of which are "use the default" outcomes, not errors.
    pub(crate) fn evaluate_flag(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: VariationType,
    ) -> Result<Option<EvaluationResult>, EvaluationError> {
        let Some(flag) = self.get_flag(flag_key) else {
            log::trace!(target: "flagcore", flag_key, subject_key; "flag not found");
            return Err(EvaluationError::FlagNotFound);
        };

        if flag.variation_type != expected_type {
            return Err(EvaluationError::TypeMismatch {
                expected: expected_type,
                found: flag.variation_type,
            });
        }

        if !flag.enabled {
            log::trace!(target: "flagcore", flag_key, subject_key; "flag is disabled");
            return Ok(None);
        }

        let now = Utc::now();

        let mut attributes_with_id = subject_attributes.clone();
        attributes_with_id
            .entry(SUBJECT_KEY_ATTRIBUTE.to_owned())
            .or_insert_with(|| subject_key.into());

        let Some((allocation, split)) = flag.allocations.iter().find_map(|allocation| {
            allocation
                .matching_split(subject_key, &attributes_with_id, flag.total_shards, now, self.obfuscated)
                .map(|split| (allocation, split))
        }) else {
            log::trace!(target: "flagcore", flag_key, subject_key; "no allocation matched");
            return Ok(None);
        };

        let variation = flag
            .variations
            .get(&split.variation_key)
            .ok_or(EvaluationError::MissingVariation)?;

        let decoded = if self.obfuscated {
            obfuscation::decode_value(variation.value.as_str().unwrap_or_default())
                .map_err(|_| EvaluationError::BadBase64)?
        } else {
            variation.value.stringify()
        };

        let value = parse_assigned_value(&decoded, expected_type)?;

        let extra_logging = if self.obfuscated {
            let mut out = std::collections::HashMap::with_capacity(split.extra_logging.len());
            for (k, v) in &split.extra_logging {
                let key = obfuscation::decode_value(k).map_err(|_| EvaluationError::BadBase64)?;
                let value = obfuscation::decode_value(v).map_err(|_| EvaluationError::BadBase64)?;
                out.insert(key, value);
            }
            out
        } else {
            split.extra_logging.clone()
        };

        let allocation_key = if self.obfuscated {
            obfuscation::decode_value(&allocation.key).map_err(|_| EvaluationError::BadBase64)?
        } else {
            allocation.key.clone()
        };
        let variation_key = if self.obfuscated {
            obfuscation::decode_value(&variation.key).map_err(|_| EvaluationError::BadBase64)?
        } else {
            variation.key.clone()
        };

        log::trace!(target: "flagcore", flag_key, subject_key, variation_key; "flag evaluated");

        Ok(Some(EvaluationResult {
            value,
            allocation_key,
            variation_key,
            do_log: allocation.do_log,
            extra_logging,
        }))
    }
}

/// Converts a decoded/stringified wire value into the caller-facing typed representation.
fn parse_assigned_value(
    raw: &str,
    ty: VariationType,
) -> Result<AssignedValue, EvaluationError> {
    Ok(match ty {
        VariationType::Boolean => AssignedValue::Boolean(
            raw.parse().map_err(|_| EvaluationError::ValueNotSet)?,
        ),
        VariationType::Integer => {
            let n: f64 = raw.parse().map_err(|_| EvaluationError::ValueNotSet)?;
            let i = n as i64;
            if i as f64 != n {
                return Err(EvaluationError::ValueNotSet);
            }
            AssignedValue::Integer(i)
        }
        VariationType::Numeric => {
            AssignedValue::Numeric(raw.parse().map_err(|_| EvaluationError::ValueNotSet)?)
        }
        VariationType::String => AssignedValue::String(raw.into()),
        VariationType::Json => AssignedValue::Json(
            serde_json::from_str(raw).map_err(|_| EvaluationError::ValueNotSet)?,
        ),
    })
}

impl Allocation {
    fn matching_split(
        &self,
        subject_key: &str,
        attributes_with_id: &Attributes,
        total_shards: u32,
        now: Timestamp,
        obfuscated: bool,
    ) -> Option<&Split> {
        if self.is_active_at(now) && self.rules_match(attributes_with_id, obfuscated) {
            self.splits
                .iter()
                .find(|split| split.matches(subject_key, total_shards))
        } else {
            None
        }
    }

    fn is_active_at(&self, now: Timestamp) -> bool {
        let too_early = matches!(self.start_at, Some(t) if now < t);
        let too_late = matches!(self.end_at, Some(t) if now > t);
        !too_early && !too_late
    }

    fn rules_match(&self, attributes_with_id: &Attributes, obfuscated: bool) -> bool {
        self.rules.is_empty()
            || self
                .rules
                .iter()
                .any(|rule| rule.eval(attributes_with_id, obfuscated))
    }
}

impl Split {
    fn matches(&self, subject_key: &str, total_shards: u32) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.matches(subject_key, total_shards))
    }
}

impl Shard {
    fn matches(&self, subject_key: &str, total_shards: u32) -> bool {
        let sharder = Md5Sharder;
        let h = sharder.shard_segments(&[self.salt.as_str(), "-", subject_key], total_shards);
        self.ranges.iter().any(|range| range.contains(h))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::models::{ShardRange, Variation, WireValue};
    use super::*;

    fn sample_flag(total_shards: u32, range: ShardRange) -> Flag {
        let mut variations = HashMap::new();
        variations.insert(
            "on".to_owned(),
            Variation {
                key: "on".to_owned(),
                value: WireValue::Boolean(true),
            },
        );
        Flag {
            key: "flag".to_owned(),
            enabled: true,
            variation_type: VariationType::Boolean,
            variations,
            allocations: vec![Allocation {
                key: "alloc".to_owned(),
                rules: vec![],
                start_at: None,
                end_at: None,
                splits: vec![Split {
                    shards: vec![Shard {
                        salt: "salt".to_owned(),
                        ranges: vec![range],
                    }],
                    variation_key: "on".to_owned(),
                    extra_logging: HashMap::new(),
                }],
                do_log: true,
            }],
            total_shards,
        }
    }

    fn config_with_flag(flag: Flag) -> Configuration {
        let mut flags = HashMap::new();
        flags.insert(
            "flag".to_owned(),
            crate::config::models::TryParse::Parsed(flag),
        );
        Configuration {
            created_at: None,
            format: crate::config::models::ConfigurationFormat::Server,
            obfuscated: false,
            flags,
        }
    }

    #[test]
    fn disabled_flag_short_circuits() {
        let mut flag = sample_flag(10_000, ShardRange { start: 0, end: 10_000 });
        flag.enabled = false;
        let config = config_with_flag(flag);
        let result = config
            .evaluate_flag("flag", "alice", &Attributes::new(), VariationType::Boolean)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn matching_shard_range_resolves_variation() {
        let flag = sample_flag(10_000, ShardRange { start: 0, end: 10_000 });
        let config = config_with_flag(flag);
        let result = config
            .evaluate_flag("flag", "alice", &Attributes::new(), VariationType::Boolean)
            .unwrap()
            .unwrap();
        assert_eq!(result.value, AssignedValue::Boolean(true));
        assert_eq!(result.allocation_key, "alloc");
    }

    #[test]
    fn non_matching_shard_range_yields_no_allocation() {
        let flag = sample_flag(10_000, ShardRange { start: 0, end: 1 });
        let config = config_with_flag(flag);
        let result = config
            .evaluate_flag("flag", "alice", &Attributes::new(), VariationType::Boolean)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let flag = sample_flag(10_000, ShardRange { start: 0, end: 10_000 });
        let config = config_with_flag(flag);
        let err = config
            .evaluate_flag("flag", "alice", &Attributes::new(), VariationType::String)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::TypeMismatch { .. }));
    }
}
