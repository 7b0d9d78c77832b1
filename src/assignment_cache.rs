//! Assignment-log deduplication (C10).
//!
//! A subject can be re-evaluated against the same flag many times in a process's lifetime (every
//! page load, every request). Without deduplication, every one of those calls would emit an
//! assignment-log event, flooding the logger with redundant rows. The cache tracks which
//! `(subject, flag, allocation, variation)` tuples have already been logged and tells the emitter
//! to skip the rest.

use std::collections::HashSet;
use std::sync::Mutex;

/// Identifies a single loggable assignment outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignmentCacheKey {
    /// Key of the subject the assignment was made for.
    pub subject_key: String,
    /// Key of the flag that was evaluated.
    pub flag_key: String,
    /// Key of the allocation that matched.
    pub allocation_key: String,
    /// Key of the variation that was assigned.
    pub variation_key: String,
}

/// Decides whether an assignment outcome should be logged.
///
/// Implementations must make [`AssignmentCache::should_log`] atomic: two threads racing to
/// evaluate the same subject/flag must not both get `true`.
pub trait AssignmentCache: Send + Sync {
    /// Atomically records `key` as seen and returns `true` iff this is the first time it has
    /// been seen by this cache. This is the only method dedup correctness depends on.
    fn should_log(&self, key: &AssignmentCacheKey) -> bool;

    /// Returns `true` if `key` has already been logged. Provided for compatibility with callers
    /// that want to inspect cache state without mutating it; racy by construction; prefer
    /// `should_log` for anything that gates an actual log emission.
    fn has_logged(&self, key: &AssignmentCacheKey) -> bool;

    /// Marks `key` as logged without checking whether it already was. Provided alongside
    /// `has_logged` as a compatibility surface; `should_log` remains the only method that
    /// guarantees at-most-once semantics under concurrency.
    fn mark_logged(&self, key: &AssignmentCacheKey);
}

/// The production cache: a mutex-guarded set of every key seen so far.
///
/// Not persisted anywhere; its lifecycle is tied to whatever holds it (normally the evaluator
/// instance), so a process restart naturally resets deduplication.
#[derive(Debug, Default)]
pub struct InMemoryAssignmentCache {
    seen: Mutex<HashSet<AssignmentCacheKey>>,
}

impl InMemoryAssignmentCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentCache for InMemoryAssignmentCache {
    fn should_log(&self, key: &AssignmentCacheKey) -> bool {
        let mut seen = self.seen.lock().expect("assignment cache lock poisoned");
        seen.insert(key.clone())
    }

    fn has_logged(&self, key: &AssignmentCacheKey) -> bool {
        let seen = self.seen.lock().expect("assignment cache lock poisoned");
        seen.contains(key)
    }

    fn mark_logged(&self, key: &AssignmentCacheKey) {
        let mut seen = self.seen.lock().expect("assignment cache lock poisoned");
        seen.insert(key.clone());
    }
}

/// A cache that never remembers anything: every call to `should_log` returns `true`, so every
/// evaluation that reaches the logger actually logs. Used when the caller disables
/// `assignment_cache_enabled`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAssignmentCache;

impl AssignmentCache for NoopAssignmentCache {
    fn should_log(&self, _key: &AssignmentCacheKey) -> bool {
        true
    }

    fn has_logged(&self, _key: &AssignmentCacheKey) -> bool {
        false
    }

    fn mark_logged(&self, _key: &AssignmentCacheKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(subject: &str) -> AssignmentCacheKey {
        AssignmentCacheKey {
            subject_key: subject.to_owned(),
            flag_key: "flag".to_owned(),
            allocation_key: "alloc".to_owned(),
            variation_key: "on".to_owned(),
        }
    }

    #[test]
    fn should_log_once_per_key() {
        let cache = InMemoryAssignmentCache::new();
        let k = key("alice");
        assert!(cache.should_log(&k));
        assert!(!cache.should_log(&k));
    }

    #[test]
    fn distinct_keys_each_log_once() {
        let cache = InMemoryAssignmentCache::new();
        assert!(cache.should_log(&key("alice")));
        assert!(cache.should_log(&key("bob")));
    }

    #[test]
    fn has_logged_and_mark_logged_compatibility_surface() {
        let cache = InMemoryAssignmentCache::new();
        let k = key("alice");
        assert!(!cache.has_logged(&k));
        cache.mark_logged(&k);
        assert!(cache.has_logged(&k));
    }

    #[test]
    fn noop_cache_always_logs() {
        let cache = NoopAssignmentCache;
        let k = key("alice");
        assert!(cache.should_log(&k));
        assert!(cache.should_log(&k));
    }

    #[test]
    fn should_log_is_atomic_under_contention() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let cache = Arc::new(InMemoryAssignmentCache::new());
        let barrier = Arc::new(Barrier::new(8));
        let k = Arc::new(key("alice"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                let k = Arc::clone(&k);
                thread::spawn(move || {
                    barrier.wait();
                    cache.should_log(&k)
                })
            })
            .collect();

        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| **r).count(), 1);
    }
}
