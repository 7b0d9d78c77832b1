//! Error types for the evaluation core.
//!
//! The core draws a hard line between two kinds of failure:
//!
//! - [`Error`] is *surfaced*: it is returned from configuration construction and callers are
//!   expected to handle it (or propagate it).
//! - [`EvaluationError`] is *recovered locally*: it never escapes `assign*`. Every evaluation
//!   path that can produce one collapses to the caller's default value instead.

use crate::value::VariationType;

/// Result type for operations that construct or otherwise manage configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing or replacing a [`crate::Configuration`].
///
/// These are surfaced to the caller: a configuration that fails to parse is never partially
/// installed.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Top-level configuration JSON could not be parsed at all.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The `format` discriminant in the wire payload is not one this core understands.
    #[error("invalid configuration: unknown format {0:?}")]
    UnknownFormat(String),
}

/// Errors that can occur while evaluating a single flag for a single subject.
///
/// Every variant here is *recovered*: [`crate::evaluator::Evaluator::assign`] and friends never
/// return these to the caller, they map them to the supplied default value. The enum still exists
/// (rather than folding everything into `bool`) so that logging and evaluation-details tooling can
/// tell failure modes apart.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    /// No configuration has been fetched/installed yet.
    #[error("configuration missing")]
    ConfigurationMissing,

    /// The requested flag does not exist, or exists but is disabled.
    #[error("flag not found or disabled")]
    FlagNotFound,

    /// Flag exists but its `variation_type` does not match the type requested by the caller.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Type requested by the caller.
        expected: VariationType,
        /// Actual type of the flag.
        found: VariationType,
    },

    /// No allocation matched the subject, or the matching allocation had no matching split.
    #[error("no allocation matched")]
    NoAllocation,

    /// A split referenced a variation key that does not exist on the flag. Indicates a
    /// malformed configuration; the offending allocation is skipped rather than aborting the
    /// whole evaluation.
    #[error("split references unknown variation")]
    MissingVariation,

    /// A base64 payload in an obfuscated configuration did not decode.
    #[error("malformed base64 in obfuscated configuration")]
    BadBase64,

    /// A regex operand in plaintext mode failed to compile.
    #[error("malformed regex operand")]
    BadRegex,

    /// The decoded/typed value does not carry the payload the caller asked for (e.g. calling
    /// `get_string` on a `Numeric`).
    #[error("value not set for requested type")]
    ValueNotSet,

    /// The evaluator has not been given a configuration store to read from.
    #[error("evaluator not initialized")]
    NotInitialized,
}
