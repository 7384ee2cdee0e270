//! In-memory stale-while-revalidate cache for feed payloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::UtcDateTime;

/// Stored value plus the timing needed to judge its freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: UtcDateTime,
    pub ttl: Duration,
    pub stale_window: Duration,
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub value: T,
    pub fetched_at: UtcDateTime,
    pub age: Duration,
    /// Past `ttl` but still inside the stale window.
    pub is_stale: bool,
}

impl<T> CacheEntry<T> {
    fn servable_for(&self) -> Duration {
        self.ttl.saturating_add(self.stale_window)
    }
}

/// Thread-safe keyed cache with one entry per key and no eviction.
///
/// Entries past `ttl` keep being served (flagged stale) for an additional stale
/// window; past that window reads report a miss while the entry stays in place
/// until the next `set` overwrites it.
#[derive(Debug)]
pub struct GenericCache<T> {
    clock: Arc<dyn Clock>,
    stale_window: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> GenericCache<T> {
    pub fn new(clock: Arc<dyn Clock>, stale_window: Duration) -> Self {
        Self {
            clock,
            stale_window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheHit<T>> {
        let now = self.clock.now();
        let entries = self.entries.lock().expect("cache lock is not poisoned");
        let entry = entries.get(key)?;

        let age = now.duration_since(entry.fetched_at);
        if age >= entry.servable_for() {
            return None;
        }

        Some(CacheHit {
            value: entry.value.clone(),
            fetched_at: entry.fetched_at,
            age,
            is_stale: age >= entry.ttl,
        })
    }

    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let now = self.clock.now();
        self.insert(key.into(), value, ttl, now);
    }

    /// Stores a value fetched earlier (e.g. restored from a snapshot). Timestamps in
    /// the future are clamped to now.
    pub fn set_at(&self, key: impl Into<String>, value: T, ttl: Duration, fetched_at: UtcDateTime) {
        let now = self.clock.now();
        self.insert(key.into(), value, ttl, fetched_at.min(now));
    }

    /// Read-modify-write under the cache lock. `update` receives the current value
    /// regardless of its age.
    pub fn update<F>(&self, key: impl Into<String>, ttl: Duration, update: F) -> T
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("cache lock is not poisoned");
        let value = update(entries.get(&key).map(|entry| &entry.value));
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                fetched_at: now,
                ttl,
                stale_window: self.stale_window,
            },
        );
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock is not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: String, value: T, ttl: Duration, fetched_at: UtcDateTime) {
        let mut entries = self.entries.lock().expect("cache lock is not poisoned");
        entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at,
                ttl,
                stale_window: self.stale_window,
            },
        );
    }
}
