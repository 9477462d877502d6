//! Bounded, time-windowed storage of completed HIGH intervals.
//!
//! Samples are append-only: once inserted a sample is never modified, only
//! evicted from the front. Readers copy out a consistent slice under a
//! short read lock, so a query running alongside an append sees either the
//! window before the append or after it.

use super::{duration_secs, PinId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A completed HIGH interval, recorded at its falling edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// When the interval ended
    pub timestamp: DateTime<Utc>,
    /// How long the line was HIGH
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl HistorySample {
    pub fn new(timestamp: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            timestamp,
            duration,
        }
    }
}

/// Ordered samples for one pin, oldest first.
#[derive(Debug, Default, Clone)]
struct HistoryWindow {
    samples: VecDeque<HistorySample>,
}

impl HistoryWindow {
    fn push(&mut self, sample: HistorySample, retention: Duration, max_samples: usize) {
        if let Some(cutoff) = cutoff(sample.timestamp, retention) {
            while self
                .samples
                .front()
                .is_some_and(|oldest| oldest.timestamp < cutoff)
            {
                self.samples.pop_front();
            }
        }

        self.samples.push_back(sample);
        while self.samples.len() > max_samples {
            self.samples.pop_front();
        }
    }

    fn since(&self, since: DateTime<Utc>) -> Vec<HistorySample> {
        let start = self.samples.partition_point(|s| s.timestamp < since);
        self.samples.range(start..).copied().collect()
    }

    fn latest(&self, count: usize, since: Option<DateTime<Utc>>) -> Vec<HistorySample> {
        let first_live = since.map_or(0, |since| self.samples.partition_point(|s| s.timestamp < since));
        let start = self.samples.len().saturating_sub(count).max(first_live);
        self.samples.range(start..).copied().collect()
    }
}

/// Shared handle to every pin's history window.
///
/// Cloning is cheap; all clones see the same data. Only the monitor task
/// appends, any task may query.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    windows: Arc<RwLock<HashMap<PinId, HistoryWindow>>>,
    retention: Duration,
    max_samples: usize,
}

impl HistoryStore {
    /// Create a store that keeps samples for `retention` and at most
    /// `max_samples` per pin.
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            retention,
            max_samples: max_samples.max(1),
        }
    }

    /// Append a sample, evicting everything older than the retention horizon
    /// (measured from the new sample) and then the oldest samples over the cap.
    pub fn append(&self, pin: PinId, sample: HistorySample) {
        let mut windows = self.write();
        windows
            .entry(pin)
            .or_default()
            .push(sample, self.retention, self.max_samples);
    }

    /// Samples with `timestamp >= since`, oldest first. Unknown pins yield
    /// an empty sequence.
    pub fn query(&self, pin: PinId, since: DateTime<Utc>) -> Vec<HistorySample> {
        self.read()
            .get(&pin)
            .map(|window| window.since(since))
            .unwrap_or_default()
    }

    /// Samples from the last `hours` hours relative to `now`, never reaching
    /// further back than the retention horizon.
    ///
    /// A zero-hour window is always empty.
    pub fn query_hours(&self, pin: PinId, hours: u32, now: DateTime<Utc>) -> Vec<HistorySample> {
        if hours == 0 {
            return Vec::new();
        }
        let span = Duration::from_secs(u64::from(hours) * 3600).min(self.retention);
        let since = cutoff(now, span);
        self.read()
            .get(&pin)
            .map(|window| window.latest(usize::MAX, since))
            .unwrap_or_default()
    }

    /// The most recent `count` samples for a pin that are still inside the
    /// retention horizon at `now`, oldest first.
    pub fn latest(&self, pin: PinId, count: usize, now: DateTime<Utc>) -> Vec<HistorySample> {
        let since = cutoff(now, self.retention);
        self.read()
            .get(&pin)
            .map(|window| window.latest(count, since))
            .unwrap_or_default()
    }

    pub fn len(&self, pin: PinId) -> usize {
        self.read().get(&pin).map_or(0, |w| w.samples.len())
    }

    pub fn is_empty(&self, pin: PinId) -> bool {
        self.len(pin) == 0
    }

    /// Drop the history of every pin in one critical section.
    pub fn clear(&self) {
        self.write().clear();
    }

    // A panic while holding the lock cannot leave a window half-written
    // (push is the only mutation), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PinId, HistoryWindow>> {
        self.windows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PinId, HistoryWindow>> {
        self.windows.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// `now - span`, or `None` when that falls outside chrono's range.
fn cutoff(now: DateTime<Utc>, span: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
}
