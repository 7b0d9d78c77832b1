//! Assignment-log events and the logger hook they're dispatched to (C11).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Attributes;

/// A single feature-flag assignment, ready to be logged to whatever analytics storage the host
/// application uses.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// Key of the flag that was evaluated.
    pub feature_flag: String,
    /// Key of the allocation that matched.
    pub allocation: String,
    /// Synthetic experiment identifier, `"{feature_flag}-{allocation}"`.
    pub experiment: String,
    /// Key of the variation that was assigned.
    pub variation: String,
    /// Key of the subject the assignment was made for.
    pub subject: String,
    /// Snapshot of the subject's attributes at evaluation time.
    pub subject_attributes: Attributes,
    /// RFC 3339 timestamp of when the assignment occurred.
    pub timestamp: String,
    /// SDK identification metadata (name/version).
    pub meta_data: HashMap<String, String>,
    /// Extra fields from the matching split's `extra_logging`, already decoded if the source
    /// configuration was obfuscated.
    #[serde(flatten)]
    pub extra_logging: HashMap<String, String>,
}

/// Receives assignment events for the host application to forward to its analytics pipeline.
///
/// Implementations should be non-blocking where possible: the emitter invokes this synchronously
/// on the evaluation call's thread and does not spawn anything on the caller's behalf. Any panic
/// or error the logger produces is swallowed by the emitter; it never changes the value an
/// `assign*` call returns.
pub trait AssignmentLogger: Send + Sync {
    /// Called once per loggable assignment (subject to assignment-cache deduplication).
    fn log_assignment(&self, event: AssignmentEvent);
}

impl<F: Fn(AssignmentEvent) + Send + Sync> AssignmentLogger for F {
    fn log_assignment(&self, event: AssignmentEvent) {
        self(event)
    }
}

/// A logger that discards every event. Used when the host application hasn't wired up an
/// analytics sink (or doesn't need one, e.g. in tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAssignmentLogger;

impl AssignmentLogger for NoopAssignmentLogger {
    fn log_assignment(&self, _event: AssignmentEvent) {}
}
