//! Deterministic bucketing of a subject into one of `total_shards` shards.

use std::collections::HashMap;

/// Assigns an input string to one of `total_shards` shards, deterministically.
///
/// Implementations must be pure functions of `(input, total_shards)`: the same pair always
/// produces the same shard, across processes and across SDK languages, so that a subject gets
/// the same experiment bucket everywhere.
pub trait Sharder: Send + Sync {
    /// Returns a shard index in `0..total_shards`.
    fn shard(&self, input: &str, total_shards: u32) -> u32;
}

/// The production sharder: MD5 the input, take the first 4 bytes as a big-endian `u32`, and
/// reduce modulo `total_shards`.
///
/// This accepts multiple input segments so callers can hash `salt + "-" + subject_key` without
/// allocating an intermediate joined string.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Sharder;

impl Md5Sharder {
    /// Computes the shard for a set of input segments, concatenated in order before hashing.
    pub fn shard_segments(&self, input: &[impl AsRef<[u8]>], total_shards: u32) -> u32 {
        let mut hasher = md5::Context::new();
        for segment in input {
            hasher.consume(segment);
        }
        let digest = hasher.compute();
        let value = u32::from_be_bytes(digest[0..4].try_into().expect("md5 digest is 16 bytes"));
        value % total_shards
    }
}

impl Sharder for Md5Sharder {
    fn shard(&self, input: &str, total_shards: u32) -> u32 {
        self.shard_segments(&[input], total_shards)
    }
}

/// A sharder that returns a fixed, explicitly configured shard for each input, falling back to
/// `0` for anything not in the map.
///
/// Used by tests (and by callers who want to pin a subject to a specific bucket) to avoid
/// depending on MD5 reference vectors.
#[derive(Debug, Default, Clone)]
pub struct DeterministicSharder {
    overrides: HashMap<String, u32>,
}

impl DeterministicSharder {
    /// Creates a sharder that returns `0` for every input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sharder from an explicit `input -> shard` map.
    pub fn from_map(overrides: HashMap<String, u32>) -> Self {
        Self { overrides }
    }
}

impl Sharder for DeterministicSharder {
    fn shard(&self, input: &str, _total_shards: u32) -> u32 {
        self.overrides.get(input).copied().unwrap_or(0)
    }
}
