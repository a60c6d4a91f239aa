//! LRU- and time-bounded duplicate detector for packet ids.
//!
//! An ordered sequence of `(id, insertion_timestamp)` plus a lookup map from
//! id to insertion timestamp. A `head` index marks a logically-evicted
//! prefix that is compacted out lazily, so eviction never touches more than
//! the stale front of the sequence. On overflow a batch of the oldest
//! entries is evicted down to three quarters of capacity at once, rather
//! than evicting one entry per insert.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// LRU + time-bounded duplicate detector for packet ids.
pub struct Deduplicator {
    /// Insertion-ordered sequence of `(id, insertion_timestamp)`. Entries
    /// before `head` are logically evicted but not yet compacted out.
    entries: Vec<(String, Instant)>,
    /// Index of the first live entry in `entries`.
    head: usize,
    /// Authoritative insertion timestamp per live id.
    lookup: HashMap<String, Instant>,
    max_age: Duration,
    max_count: usize,
}

impl Deduplicator {
    pub fn new(max_age: Duration, max_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            head: 0,
            lookup: HashMap::new(),
            max_age,
            max_count,
        }
    }

    /// Purges entries older than `max_age`; if `id` is present, returns
    /// `true`; otherwise inserts `(id, now)`, enforces capacity, and
    /// returns `false`.
    pub fn is_duplicate(&mut self, id: &str) -> bool {
        self.is_duplicate_at(id, Instant::now())
    }

    fn is_duplicate_at(&mut self, id: &str, now: Instant) -> bool {
        self.cleanup_at(now);
        if self.lookup.contains_key(id) {
            return true;
        }
        self.insert(id.to_string(), now);
        self.evict_over_capacity();
        false
    }

    /// `true` if `id` is currently tracked (without purging expired entries first).
    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains_key(id)
    }

    /// The insertion timestamp recorded for `id`, if any.
    pub fn timestamp_for(&self, id: &str) -> Option<Instant> {
        self.lookup.get(id).copied()
    }

    /// Records `id` as seen. No-op if already present. The insertion
    /// timestamp is always the real "now" at call time — any
    /// caller-supplied `timestamp` is accepted for API symmetry but never
    /// used for eviction, so an ancient-timestamped record never vanishes
    /// on insert.
    pub fn record(&mut self, id: &str, _timestamp: Instant) {
        if self.lookup.contains_key(id) {
            return;
        }
        self.insert(id.to_string(), Instant::now());
        self.evict_over_capacity();
    }

    /// Unconditionally (re-)marks `id` as processed with the current time,
    /// without checking whether it was already present.
    pub fn mark_processed(&mut self, id: &str) {
        self.insert(id.to_string(), Instant::now());
        self.evict_over_capacity();
    }

    /// Expires entries older than `max_age`, using each entry's own
    /// insertion timestamp.
    pub fn cleanup(&mut self) {
        self.cleanup_at(Instant::now());
    }

    fn cleanup_at(&mut self, now: Instant) {
        while self.head < self.entries.len() {
            let (ref id, ts) = self.entries[self.head];
            if now.duration_since(ts) > self.max_age {
                self.forget_stale_entry(id);
                self.head += 1;
            } else {
                break;
            }
        }
        self.compact();
    }

    /// Hard clear of all state.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.head = 0;
        self.lookup.clear();
    }

    /// Number of live (non-evicted) entries.
    pub fn len(&self) -> usize {
        self.entries.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, id: String, now: Instant) {
        self.lookup.insert(id.clone(), now);
        self.entries.push((id, now));
    }

    /// If the live count exceeds `max_count`, evict the oldest
    /// `active - 3*max_count/4` entries by advancing `head`.
    fn evict_over_capacity(&mut self) {
        let active = self.len();
        if active > self.max_count {
            let target = (3 * self.max_count) / 4;
            let remove_count = active - target;
            for _ in 0..remove_count {
                if self.head >= self.entries.len() {
                    break;
                }
                let id = self.entries[self.head].0.clone();
                self.forget_stale_entry(&id);
                self.head += 1;
            }
        }
        self.compact();
    }

    /// Remove `id` from `lookup` only if the entry being evicted is still
    /// the authoritative one — a later `record`/`mark_processed` may have
    /// refreshed the same id's timestamp, leaving a stale duplicate ahead
    /// of it in `entries`.
    fn forget_stale_entry(&mut self, id: &str) {
        let stale_ts = self.entries[self.head].1;
        if self.lookup.get(id) == Some(&stale_ts) {
            self.lookup.remove(id);
        }
    }

    /// Compact the logically-evicted prefix out of `entries` once it grows
    /// past a quarter of the sequence, so the vector doesn't grow without
    /// bound under steady churn.
    fn compact(&mut self) {
        if self.head > self.entries.len() / 4 && self.head > 0 {
            self.entries.drain(0..self.head);
            self.head = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotence() {
        let mut d = Deduplicator::new(Duration::from_secs(300), 1024);
        assert!(!d.is_duplicate("a"));
        assert!(d.is_duplicate("a"));
        assert!(d.is_duplicate("a"));
    }

    #[test]
    fn record_by_insertion_time_not_caller_timestamp() {
        let mut d = Deduplicator::new(Duration::from_millis(50), 1024);
        let ancient = Instant::now() - Duration::from_secs(3600);
        d.record("a", ancient);
        d.cleanup();
        assert!(d.contains("a"), "insertion-time based, ancient caller timestamp ignored");

        // Simulate real elapsed time by cleaning up at a far-future instant.
        let later = Instant::now() + Duration::from_millis(200);
        d.cleanup_at(later);
        assert!(!d.contains("a"));
    }

    #[test]
    fn capacity_bound_keeps_most_recent() {
        let max_count = 100;
        let mut d = Deduplicator::new(Duration::from_secs(300), max_count);
        for i in 0..(10 * max_count) {
            d.is_duplicate(&format!("id-{i}"));
        }
        assert!(d.len() <= max_count);
        assert!(d.contains(&format!("id-{}", 10 * max_count - 1)));
    }

    #[test]
    fn mark_processed_refreshes_without_checking() {
        let mut d = Deduplicator::new(Duration::from_secs(300), 1024);
        d.is_duplicate("a");
        let first = d.timestamp_for("a").unwrap();
        d.mark_processed("a");
        let second = d.timestamp_for("a").unwrap();
        assert!(second >= first);
        assert!(d.is_duplicate("a"));
    }

    #[test]
    fn reset_clears_everything() {
        let mut d = Deduplicator::new(Duration::from_secs(300), 1024);
        d.is_duplicate("a");
        d.is_duplicate("b");
        d.reset();
        assert!(d.is_empty());
        assert!(!d.contains("a"));
    }
}
