// Path: crates/attest-crypto/src/replay.rs
//! The replay-detection cache (`spec.md` §4.2 step 4).
//!
//! Keyed by `H(device_id ‖ nonce ‖ t_be8)`, entries auto-expire after
//! `VALIDITY_WINDOW` — a proof can never be replayed within its validity
//! window, and once a proof has fallen out of the window it is rejected
//! as `STALE_PROOF` before the cache is even consulted, so eviction only
//! needs to bound memory, not correctness.

use attest_types::ids::Digest;
use dashmap::DashMap;
use std::time::Duration;

/// An in-memory, TTL-bounded set of recently-seen proof keys.
#[derive(Debug, Default)]
pub struct ReplayCache {
    seen: DashMap<Digest, u64>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Returns `true` and records `key` if it has not been seen within
    /// `ttl` of `now`; returns `false` (a replay) if it has.
    ///
    /// A stale entry found during the check is treated as expired and
    /// overwritten rather than triggering a false replay.
    pub fn check_and_insert(&self, key: Digest, now: u64, ttl: Duration) -> bool {
        let ttl_secs = ttl.as_secs();
        match self.seen.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let inserted_at = *occupied.get();
                if now.saturating_sub(inserted_at) > ttl_secs {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }

    /// Drops every entry older than `ttl` relative to `now`. Intended to
    /// be called periodically by a background sweeper so the cache does
    /// not grow without bound across a long-running process.
    pub fn sweep_expired(&self, now: u64, ttl: Duration) -> usize {
        let ttl_secs = ttl.as_secs();
        let before = self.seen.len();
        self.seen
            .retain(|_, inserted_at| now.saturating_sub(*inserted_at) <= ttl_secs);
        before - self.seen.len()
    }

    /// The current number of tracked entries, for diagnostics.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_within_ttl_is_replay() {
        let cache = ReplayCache::new();
        let key = Digest([1u8; 32]);
        assert!(cache.check_and_insert(key, 1000, Duration::from_secs(300)));
        assert!(!cache.check_and_insert(key, 1100, Duration::from_secs(300)));
    }

    #[test]
    fn insert_after_ttl_expiry_is_accepted() {
        let cache = ReplayCache::new();
        let key = Digest([1u8; 32]);
        assert!(cache.check_and_insert(key, 1000, Duration::from_secs(300)));
        assert!(cache.check_and_insert(key, 1301, Duration::from_secs(300)));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = ReplayCache::new();
        cache.check_and_insert(Digest([1u8; 32]), 1000, Duration::from_secs(300));
        cache.check_and_insert(Digest([2u8; 32]), 1400, Duration::from_secs(300));
        let removed = cache.sweep_expired(1400, Duration::from_secs(300));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }
}
