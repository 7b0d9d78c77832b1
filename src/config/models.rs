//! The configuration data model: flags, allocations, splits, shards, and targeting rules.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::obfuscation;
use crate::value::{TypedValue, VariationType};

/// Timestamp type used throughout the configuration model.
pub type Timestamp = DateTime<Utc>;

/// `TryParse` lets one malformed flag fail to parse without failing the whole document: a
/// configuration with 999 good flags and one bad one still serves the 999.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed; the raw JSON is kept around for diagnostics/logging.
    ParseFailed(serde_json::Value),
}

impl<T> TryParse<T> {
    /// Returns the parsed value, if parsing succeeded.
    pub fn ok(&self) -> Option<&T> {
        match self {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// How a [`Configuration`]'s keys and values are encoded.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfigurationFormat {
    /// Plaintext configuration as produced by the originating server.
    Server,
    /// Configuration safe to ship to an untrusted client: flag keys are MD5-hex, values and
    /// string operands are base64/MD5-hex per [`crate::obfuscation`].
    Client,
}

/// A full flag configuration: every flag this SDK instance knows about.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// When this configuration was generated, if the server reported it.
    pub created_at: Option<Timestamp>,
    /// Declared wire format.
    pub format: ConfigurationFormat,
    /// Whether flag keys/values in `flags` are obfuscated. Mirrors `format == Client`, kept as
    /// its own field because it's what evaluation code actually branches on.
    pub obfuscated: bool,
    /// Flags keyed by their (possibly obfuscated) key.
    pub flags: HashMap<String, TryParse<Flag>>,
}

/// Wire shape of a [`Configuration`], before the per-flag `TryParse` isolation is applied.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationWire {
    #[serde(default)]
    created_at: Option<Timestamp>,
    #[serde(default)]
    format: Option<ConfigurationFormat>,
    #[serde(default)]
    flags: HashMap<String, TryParse<Flag>>,
}

impl Configuration {
    /// Parses a plaintext (`format: "SERVER"`) configuration document.
    pub fn from_server_response(json: &str) -> Result<Configuration> {
        Self::from_json(json, false)
    }

    /// Parses an obfuscated (`format: "CLIENT"`) configuration document.
    pub fn from_obfuscated_response(json: &str) -> Result<Configuration> {
        Self::from_json(json, true)
    }

    fn from_json(json: &str, expect_obfuscated: bool) -> Result<Configuration> {
        let wire: ConfigurationWire =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        let format = wire.format.unwrap_or(if expect_obfuscated {
            ConfigurationFormat::Client
        } else {
            ConfigurationFormat::Server
        });

        let obfuscated = match format {
            ConfigurationFormat::Client => true,
            ConfigurationFormat::Server => false,
        };

        Ok(Configuration {
            created_at: wire.created_at,
            format,
            obfuscated,
            flags: wire.flags,
        })
    }

    /// An empty configuration: no flags known yet. Every evaluation against this returns the
    /// caller's default value.
    pub fn empty() -> Configuration {
        Configuration {
            created_at: None,
            format: ConfigurationFormat::Server,
            obfuscated: false,
            flags: HashMap::new(),
        }
    }

    /// Looks up a flag by its plaintext key, hashing it first if this configuration is
    /// obfuscated.
    pub(crate) fn get_flag(&self, flag_key: &str) -> Option<&Flag> {
        let lookup_key = if self.obfuscated {
            obfuscation::hash_key(flag_key)
        } else {
            flag_key.to_owned()
        };
        self.flags.get(&lookup_key).and_then(TryParse::ok)
    }
}

/// A single feature flag: its variations, and the allocations that decide which subjects get
/// which variation.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    /// The flag's key. Under obfuscation this is base64-encoded (it is carried for display, the
    /// map key used for lookup is the MD5 hash).
    pub key: String,
    /// Whether the flag is enabled at all. A disabled flag always yields no assignment.
    pub enabled: bool,
    /// The type every variation on this flag must conform to.
    pub variation_type: VariationType,
    /// Variations keyed by variation key.
    pub variations: HashMap<String, Variation>,
    /// Allocations, evaluated in order; the first one that matches wins.
    pub allocations: Vec<Allocation>,
    /// Total number of shards subjects are bucketed into for this flag.
    pub total_shards: u32,
}

/// A single named variation value on a flag.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    /// The variation's key, referenced by [`Split::variation_key`].
    pub key: String,
    /// The variation's value, in the flag's `variation_type`. Under obfuscation this is
    /// base64-encoded regardless of the underlying type.
    pub value: WireValue,
}

/// The untyped JSON shape of a variation/condition value on the wire, before it's combined with
/// a [`VariationType`] (for variations) or interpreted directly (for condition operands).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum WireValue {
    /// A boolean literal.
    Boolean(bool),
    /// A numeric literal.
    Number(f64),
    /// A string literal (or, under obfuscation, a base64/MD5 blob).
    String(String),
}

impl WireValue {
    /// Renders this value as the string that obfuscation would have base64-encoded: booleans
    /// and numbers are stringified first, strings pass through unchanged.
    pub(crate) fn stringify(&self) -> String {
        match self {
            WireValue::Boolean(b) => b.to_string(),
            WireValue::Number(n) => n.to_string(),
            WireValue::String(s) => s.clone(),
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to a [`TypedValue`] using its own shape (no external typing information).
    pub(crate) fn to_typed_value(&self) -> TypedValue {
        match self {
            WireValue::Boolean(b) => TypedValue::Bool(*b),
            WireValue::Number(n) => TypedValue::Numeric(*n),
            WireValue::String(s) => TypedValue::String(s.clone()),
        }
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_owned())
    }
}

/// A named slice of a flag's evaluation: when its [`TargetingRule`]s (if any) match and it's
/// within its active time window, one of its [`Split`]s decides the variation.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// The allocation's key.
    pub key: String,
    /// Targeting rules. An allocation with no rules matches every subject.
    #[serde(default)]
    pub rules: Vec<TargetingRule>,
    /// If set, the allocation cannot match before this time.
    #[serde(default)]
    pub start_at: Option<Timestamp>,
    /// If set, the allocation cannot match after this time.
    #[serde(default)]
    pub end_at: Option<Timestamp>,
    /// Splits, evaluated in order; the first whose shards all match wins.
    pub splits: Vec<Split>,
    /// Whether a match against this allocation should produce an assignment-log event.
    #[serde(default = "default_do_log")]
    pub do_log: bool,
}

fn default_do_log() -> bool {
    true
}

/// A set of [`TargetingCondition`]s that must all hold for the rule to match.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TargetingRule {
    /// Conditions, all of which must hold (AND semantics).
    pub conditions: Vec<TargetingCondition>,
}

/// A single attribute check: `attribute <operator> value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetingCondition {
    /// Which comparison to apply.
    pub operator: OperatorType,
    /// Name of the subject attribute to read.
    pub attribute: String,
    /// The operand to compare against.
    pub value: ConditionValue,
}

/// The closed set of comparison operators a [`TargetingCondition`] can use.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorType {
    /// Regex match. Operand is a regex source string (plaintext mode only).
    Matches,
    /// Negated regex match. Unsupported (always `false`) under obfuscation.
    NotMatches,
    /// Greater-than-or-equal, numeric or semver-shaped string comparison.
    Gte,
    /// Greater-than, numeric or semver-shaped string comparison.
    Gt,
    /// Less-than-or-equal, numeric or semver-shaped string comparison.
    Lte,
    /// Less-than, numeric or semver-shaped string comparison.
    Lt,
    /// Membership in a string set.
    OneOf,
    /// Non-membership in a string set. Absent attribute always fails this (is not "not one of").
    NotOneOf,
    /// Null check. Operand is a boolean: `true` for "is null", `false` for "is not null".
    IsNull,
}

/// The operand of a [`TargetingCondition`]: either a single scalar or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// A scalar operand (used by everything except `ONE_OF`/`NOT_ONE_OF`).
    Single(WireValue),
    /// A list operand (used by `ONE_OF`/`NOT_ONE_OF`). Under obfuscation, every entry is
    /// MD5-hex already.
    Multiple(Vec<String>),
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Single(WireValue::from(value))
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Single(WireValue::Number(value))
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        ConditionValue::Single(WireValue::Boolean(value))
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(value: Vec<String>) -> Self {
        ConditionValue::Multiple(value)
    }
}

/// One candidate outcome of an [`Allocation`]: a variation plus the shard ranges a subject must
/// fall into to receive it.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    /// Shards that must all match for this split to apply.
    pub shards: Vec<Shard>,
    /// Key of the variation this split resolves to.
    pub variation_key: String,
    /// Extra key-value pairs copied verbatim into the assignment-log event.
    #[serde(default)]
    pub extra_logging: HashMap<String, String>,
}

/// A single sharding dimension: a salt plus the ranges a subject's shard must fall in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shard {
    /// Per-dimension salt, mixed with the subject key before hashing.
    pub salt: String,
    /// Ranges, any of which matching is sufficient.
    pub ranges: Vec<ShardRange>,
}

/// A half-open `[start, end)` range of shard indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardRange {
    /// Inclusive lower bound.
    pub start: u32,
    /// Exclusive upper bound.
    pub end: u32,
}

impl ShardRange {
    pub(crate) fn contains(&self, v: u32) -> bool {
        self.start <= v && v < self.end
    }
}

/// A key used to look up a subject's cheap, non-sensitive identifier for use in targeting rules
/// (`"id"`), mirroring the teacher's convention of augmenting attributes with the subject key.
pub(crate) const SUBJECT_KEY_ATTRIBUTE: &str = "id";
