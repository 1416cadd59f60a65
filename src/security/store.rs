//! Backing storage for rate-limit records.
//!
//! The sliding-window algorithm only talks to [`RateLimitStore`], so the same
//! limiter runs against the in-process [`InMemoryStore`] or a shared cache.
//!
//! An in-process store gives every process its own quota. Deployments that
//! run more than one instance need a shared implementation whose `update`
//! is an atomic read-modify-write on the cache (a server-side script or a
//! compare-and-swap loop), otherwise two concurrent requests can both see
//! `count < max` for the last slot.

use std::collections::VecDeque;
use std::fmt::Debug;

use dashmap::DashMap;

/// Request timestamps for one client key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Admission times in epoch milliseconds, oldest first.
    pub timestamps: VecDeque<u64>,
    /// Window the record was last written with, used by the sweep.
    pub window_ms: u64,
}

impl RateLimitRecord {
    /// Drop every timestamp at or before `window_start`.
    pub fn prune(&mut self, window_start: u64) {
        while self
            .timestamps
            .front()
            .is_some_and(|&t| t <= window_start)
        {
            self.timestamps.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Key-value store for rate-limit records.
pub trait RateLimitStore: Send + Sync + Debug {
    /// Snapshot of a record.
    fn get(&self, key: &str) -> Option<RateLimitRecord>;

    /// Replace a record.
    fn set(&self, key: &str, record: RateLimitRecord);

    /// Remove a record.
    fn delete(&self, key: &str);

    /// Atomically read, modify and write the record for `key`.
    ///
    /// The closure receives the current record (default if absent). If it
    /// leaves the record empty the key is removed. No other update for the
    /// same key may interleave with the closure.
    fn update(&self, key: &str, f: &mut dyn FnMut(&mut RateLimitRecord));

    /// Keep only records for which `keep` returns true.
    fn retain(&self, keep: &mut dyn FnMut(&str, &mut RateLimitRecord) -> bool);

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sharded in-process store backed by DashMap.
///
/// `update` holds the shard write lock for the duration of the closure,
/// which makes the check-and-record step atomic within one process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    map: DashMap<String, RateLimitRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<RateLimitRecord> {
        self.map.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, record: RateLimitRecord) {
        self.map.insert(key.to_string(), record);
    }

    fn delete(&self, key: &str) {
        self.map.remove(key);
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(&mut RateLimitRecord)) {
        let mut entry = self.map.entry(key.to_string()).or_default();
        f(entry.value_mut());
        let now_empty = entry.is_empty();
        drop(entry);

        if now_empty {
            self.map.remove_if(key, |_, record| record.is_empty());
        }
    }

    fn retain(&self, keep: &mut dyn FnMut(&str, &mut RateLimitRecord) -> bool) {
        self.map.retain(|key, record| keep(key, record));
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
