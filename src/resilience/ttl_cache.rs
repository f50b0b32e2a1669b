//! Bounded key admission with time-based expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::utils::time::deadline_after;

/// Admits each key at most once per `ttl`, holding at most `maxsize` keys.
///
/// Used to rate limit repeated notifications such as health events.
#[derive(Debug)]
pub struct RateLimitingTtlCache<K> {
    maxsize: usize,
    ttl: Duration,
    entries: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash + Clone> RateLimitingTtlCache<K> {
    pub fn new(maxsize: usize, ttl: Duration) -> Self {
        Self {
            maxsize,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit `key`.
    ///
    /// Returns false when the key was admitted within the last `ttl` or the
    /// cache is full of unexpired keys.
    pub fn acquire(&self, key: K) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);

        if entries.len() >= self.maxsize || entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, deadline_after(now, self.ttl));
        true
    }

    /// Number of unexpired keys
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
