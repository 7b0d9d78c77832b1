//! The top-level evaluator: wires configuration storage, the standard and precomputed evaluation
//! paths, assignment-cache deduplication, and the assignment logger into a single `assign*` API.

use std::sync::Arc;

use chrono::Utc;

use crate::assignment_cache::{AssignmentCache, AssignmentCacheKey, InMemoryAssignmentCache};
use crate::attributes::Subject;
use crate::config::Configuration;
use crate::configuration_store::ConfigurationStore;
use crate::events::{AssignmentEvent, AssignmentLogger, NoopAssignmentLogger};
use crate::precomputed::PrecomputedConfiguration;
use crate::value::{AssignedValue, VariationType};

/// Which evaluation strategy the evaluator uses for `assign*` calls against a full
/// [`Configuration`] (as opposed to a [`PrecomputedConfiguration`], which always uses the direct
/// lookup path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluatorType {
    /// Walk rules/allocations/splits for every call.
    #[default]
    Standard,
    /// Recognized for forward-compatibility with host SDKs that plan a precomputed/optimized
    /// fast path; currently evaluates identically to [`EvaluatorType::Standard`].
    Optimized,
}

/// Tunables for an [`Evaluator`] instance.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorOptions {
    /// Whether the configuration this evaluator reads is obfuscated.
    pub obfuscated: bool,
    /// Which evaluation strategy to use.
    pub evaluator_type: EvaluatorType,
    /// Whether to deduplicate assignment-log events via an [`AssignmentCache`].
    pub assignment_cache_enabled: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        EvaluatorOptions {
            obfuscated: false,
            evaluator_type: EvaluatorType::Standard,
            assignment_cache_enabled: true,
        }
    }
}

/// Ties together configuration storage, evaluation, deduplication, and logging behind a single
/// typed `assign*` API.
///
/// Thread-safe: any number of threads may call `assign*` concurrently. Configuration replacement
/// (via the underlying [`ConfigurationStore`]) is a pointer swap readers never observe partially.
pub struct Evaluator {
    store: ConfigurationStore,
    options: EvaluatorOptions,
    cache: Box<dyn AssignmentCache>,
    logger: Box<dyn AssignmentLogger>,
}

impl Evaluator {
    /// Creates an evaluator with the given options, a [`NoopAssignmentLogger`], and (if
    /// `options.assignment_cache_enabled`) an [`InMemoryAssignmentCache`].
    pub fn new(options: EvaluatorOptions) -> Self {
        Evaluator {
            store: ConfigurationStore::new(),
            cache: build_cache(&options),
            options,
            logger: Box::new(NoopAssignmentLogger),
        }
    }

    /// Replaces the assignment logger.
    pub fn with_logger(mut self, logger: impl AssignmentLogger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    /// Replaces the assignment cache.
    pub fn with_cache(mut self, cache: impl AssignmentCache + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    /// Installs a freshly fetched/parsed configuration, replacing whatever was active before.
    pub fn set_configuration(&self, config: Configuration) {
        self.store.set_configuration(config);
    }

    /// Parses `json` and installs it, choosing the plaintext or obfuscated decoder according to
    /// `self.options.obfuscated`. Rejects the configuration (leaving the previously active one in
    /// place) if it fails to parse; see [`crate::Error`].
    pub fn set_configuration_json(&self, json: &str) -> crate::error::Result<()> {
        let config = if self.options.obfuscated {
            Configuration::from_obfuscated_response(json)?
        } else {
            Configuration::from_server_response(json)?
        };
        self.store.set_configuration(config);
        Ok(())
    }

    /// Returns a snapshot of the currently active configuration.
    pub fn configuration(&self) -> Arc<Configuration> {
        self.store.get_configuration()
    }

    /// Evaluates `flag_key` for `subject`, returning `default_value` on any recoverable failure
    /// (unknown flag, type mismatch, no matching allocation, malformed configuration fragment).
    /// Never panics, never propagates an error to the caller.
    pub fn assign(
        &self,
        flag_key: &str,
        subject: &Subject,
        expected_type: VariationType,
        default_value: AssignedValue,
    ) -> AssignedValue {
        let config = self.store.get_configuration();

        if config.flags.is_empty() {
            log::warn!(target: "flagcore", flag_key, subject_key:display = subject.subject_key;
                "evaluating a flag before a configuration has been installed");
        }

        let outcome = config.evaluate_flag(
            flag_key,
            &subject.subject_key,
            &subject.subject_attributes,
            expected_type,
        );

        let result = match outcome {
            Ok(Some(result)) => result,
            Ok(None) => return default_value,
            Err(err) => {
                log::warn!(target: "flagcore", flag_key, subject_key:display = subject.subject_key;
                    "error occurred while evaluating a flag: {:?}", err);
                return default_value;
            }
        };

        if result.do_log {
            self.emit(flag_key, subject, &result.allocation_key, &result.variation_key, &result.extra_logging);
        }

        result.value
    }

    /// Evaluates `flag_key` against a [`PrecomputedConfiguration`] via direct lookup, returning
    /// `default_value` on any recoverable failure.
    pub fn assign_precomputed(
        &self,
        precomputed: &PrecomputedConfiguration,
        flag_key: &str,
        subject: &Subject,
        expected_type: VariationType,
        default_value: AssignedValue,
    ) -> AssignedValue {
        let outcome = precomputed.lookup(flag_key, expected_type);

        let assignment = match outcome {
            Ok(Some(assignment)) => assignment,
            Ok(None) => return default_value,
            Err(err) => {
                log::warn!(target: "flagcore", flag_key, subject_key:display = subject.subject_key;
                    "error occurred while evaluating a precomputed flag: {:?}", err);
                return default_value;
            }
        };

        if assignment.do_log {
            let allocation_key = assignment.allocation_key.clone().unwrap_or_default();
            let variation_key = assignment.variation_key.clone().unwrap_or_default();
            self.emit(flag_key, subject, &allocation_key, &variation_key, &assignment.extra_logging);
        }

        assignment.value
    }

    fn emit(
        &self,
        flag_key: &str,
        subject: &Subject,
        allocation_key: &str,
        variation_key: &str,
        extra_logging: &std::collections::HashMap<String, String>,
    ) {
        let key = AssignmentCacheKey {
            subject_key: subject.subject_key.to_string(),
            flag_key: flag_key.to_owned(),
            allocation_key: allocation_key.to_owned(),
            variation_key: variation_key.to_owned(),
        };

        if !self.cache.should_log(&key) {
            return;
        }

        let event = AssignmentEvent {
            feature_flag: flag_key.to_owned(),
            allocation: allocation_key.to_owned(),
            experiment: format!("{flag_key}-{allocation_key}"),
            variation: variation_key.to_owned(),
            subject: subject.subject_key.to_string(),
            subject_attributes: subject.subject_attributes.clone(),
            timestamp: Utc::now().to_rfc3339(),
            meta_data: [(
                "sdkVersion".to_owned(),
                env!("CARGO_PKG_VERSION").to_owned(),
            )]
            .into_iter()
            .collect(),
            extra_logging: extra_logging.clone(),
        };

        log::trace!(target: "flagcore", flag_key, subject_key:display = subject.subject_key; "emitting assignment event");
        self.logger.log_assignment(event);
    }
}

fn build_cache(options: &EvaluatorOptions) -> Box<dyn AssignmentCache> {
    if options.assignment_cache_enabled {
        Box::new(InMemoryAssignmentCache::new())
    } else {
        Box::new(crate::assignment_cache::NoopAssignmentCache)
    }
}
