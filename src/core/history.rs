// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Bounded history buffers

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Anything that can be placed on a time axis
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Fixed-capacity FIFO of timestamped entries.
///
/// Appends are serialized by the write lock; queries take a read lock and
/// return owned copies, so readers never observe a half-applied append and
/// never hold references into the buffer.
pub struct HistoryBuffer<T> {
    entries: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Timestamped + Clone> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one when full
    pub fn append(&self, entry: T) {
        let mut entries = self.entries.write();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The newest `n` entries, oldest first
    pub fn latest(&self, n: usize) -> Vec<T> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Entries stamped at or after `now - duration`.
    ///
    /// When the window holds nothing (coverage shorter than the window, or
    /// a stalled source) every retained entry is returned instead.
    pub fn window(&self, duration: Duration, now: DateTime<Utc>) -> Vec<T> {
        let cutoff = now - duration;
        let entries = self.entries.read();

        let start = entries.partition_point(|e| e.timestamp() < cutoff);
        if start < entries.len() {
            entries.iter().skip(start).cloned().collect()
        } else {
            entries.iter().cloned().collect()
        }
    }

    /// Entries matching `predicate`, in order
    pub fn filter<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.entries.read().iter().filter(|e| predicate(e)).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn newest(&self) -> Option<T> {
        self.entries.read().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Tick {
        at: DateTime<Utc>,
        n: usize,
    }

    impl Timestamped for Tick {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn tick(n: usize) -> Tick {
        Tick { at: t0() + Duration::seconds(n as i64), n }
    }

    #[test]
    fn test_eviction_keeps_newest_in_order() {
        let buffer = HistoryBuffer::new(5);
        for n in 0..8 {
            buffer.append(tick(n));
        }

        assert_eq!(buffer.len(), 5);
        let ns: Vec<usize> = buffer.snapshot().iter().map(|t| t.n).collect();
        assert_eq!(ns, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_latest_returns_tail_oldest_first() {
        let buffer = HistoryBuffer::new(10);
        for n in 0..6 {
            buffer.append(tick(n));
        }

        let ns: Vec<usize> = buffer.latest(3).iter().map(|t| t.n).collect();
        assert_eq!(ns, vec![3, 4, 5]);
        assert_eq!(buffer.latest(100).len(), 6);
        assert!(buffer.latest(0).is_empty());
    }

    #[test]
    fn test_window_selects_recent_entries() {
        let buffer = HistoryBuffer::new(100);
        for n in 0..60 {
            buffer.append(tick(n));
        }

        let now = t0() + Duration::seconds(59);
        let recent = buffer.window(Duration::seconds(10), now);
        assert_eq!(recent.len(), 11);
        assert_eq!(recent.first().map(|t| t.n), Some(49));
        assert_eq!(recent.last().map(|t| t.n), Some(59));
    }

    #[test]
    fn test_window_falls_back_to_everything_when_stale() {
        let buffer = HistoryBuffer::new(100);
        for n in 0..5 {
            buffer.append(tick(n));
        }

        let much_later = t0() + Duration::hours(2);
        let entries = buffer.window(Duration::seconds(10), much_later);
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn test_filter_and_capacity() {
        let buffer: HistoryBuffer<Tick> = HistoryBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);

        let buffer = HistoryBuffer::new(10);
        for n in 0..10 {
            buffer.append(tick(n));
        }
        let even = buffer.filter(|t| t.n % 2 == 0);
        assert_eq!(even.len(), 5);
        assert_eq!(buffer.newest().map(|t| t.n), Some(9));
    }
}
