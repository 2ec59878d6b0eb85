//! Pull-through cache with TTL and max-size eviction
//!
//! Holds either a value or the error the loader produced, each with its own
//! time-to-live, so a failing upstream is not hammered on every call. When
//! full, the oldest entry is evicted on insert.
//!
//! The lock is never held across an `.await`; two concurrent misses for the
//! same key may both run the loader, and the later result wins.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

const DEFAULT_MAX_ENTRIES: usize = 1_024;

struct Entry<V, E> {
    outcome: Result<V, E>,
    expires_at: Instant,
    seq: u64,
}

struct Inner<K, V, E> {
    map: HashMap<K, Entry<V, E>>,
    next_seq: u64,
}

pub struct TtlCache<K, V, E> {
    inner: Mutex<Inner<K, V, E>>,
    ttl: Duration,
    error_ttl: Duration,
    max_entries: usize,
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new(ttl: Duration, error_ttl: Duration) -> Self {
        Self::with_capacity(ttl, error_ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, error_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                next_seq: 0,
            }),
            ttl,
            error_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Return the live cached outcome for `key`, or run `load` and cache it
    pub async fn get_or_compute<F, Fut>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(outcome) = self.get(&key) {
            return outcome;
        }

        let outcome = load().await;
        self.insert(key, outcome.clone());
        outcome
    }

    /// Live cached outcome, if any
    pub fn get(&self, key: &K) -> Option<Result<V, E>> {
        let guard = self.lock();
        guard
            .map
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.outcome.clone())
    }

    pub fn insert(&self, key: K, outcome: Result<V, E>) {
        let now = Instant::now();
        let ttl = if outcome.is_ok() {
            self.ttl
        } else {
            self.error_ttl
        };

        let mut guard = self.lock();
        guard.map.retain(|_, entry| entry.expires_at > now);
        while guard.map.len() >= self.max_entries && !guard.map.contains_key(&key) {
            let oldest = guard
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    guard.map.remove(&k);
                }
                None => break,
            }
        }

        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.map.insert(
            key,
            Entry {
                outcome,
                expires_at: now + ttl,
                seq,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V, E>> {
        // A panic while holding the guard cannot leave a half-written entry
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
