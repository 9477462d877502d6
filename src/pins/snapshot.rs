//! Immutable point-in-time views of the pin table.

use super::{HistorySample, HistoryStore, PinId, PinStateTracker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dashboard view of a single pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinView {
    pub state: bool,
    pub label: String,
    pub transitions: u64,
    /// Seconds the line has been HIGH; 0 while LOW
    pub current_high_duration: f64,
    pub last_transition: Option<DateTime<Utc>>,
    pub read_errors: u64,
    pub stale: bool,
    /// Recent completed HIGH intervals; only filled in on request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_duration_history: Option<Vec<HistorySample>>,
}

impl PinView {
    /// Whether anything other than the running HIGH duration differs.
    fn differs_from(&self, other: &PinView) -> bool {
        self.state != other.state
            || self.transitions != other.transitions
            || self.last_transition != other.last_transition
            || self.read_errors != other.read_errors
            || self.stale != other.stale
            || self.label != other.label
    }
}

/// All pins at one tick boundary. Never mutated once published; shared
/// between subscribers behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic tick number; the baseline sample is tick 0
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub pins: BTreeMap<PinId, PinView>,
    /// Pins whose view changed since the previous snapshot
    pub changed: Vec<PinId>,
}

impl Snapshot {
    /// Capture the tracker's state. `previous` is used to fill `changed`;
    /// without one every pin counts as changed.
    pub fn capture(
        tracker: &PinStateTracker,
        tick: u64,
        now: DateTime<Utc>,
        previous: Option<&Snapshot>,
    ) -> Self {
        let pins: BTreeMap<PinId, PinView> = tracker
            .states()
            .map(|(id, state)| {
                let view = PinView {
                    state: state.current_level,
                    label: state.label.clone(),
                    transitions: state.transition_count,
                    current_high_duration: state.high_duration_at(now).as_secs_f64(),
                    last_transition: state.last_transition_at,
                    read_errors: state.read_errors,
                    stale: state.stale,
                    high_duration_history: None,
                };
                (id, view)
            })
            .collect();

        let changed = match previous {
            Some(prev) => Self::diff(&prev.pins, &pins),
            None => pins.keys().copied().collect(),
        };

        Self {
            tick,
            timestamp: now,
            pins,
            changed,
        }
    }

    /// Pins present in `current` whose view differs from `previous`.
    pub fn diff(
        previous: &BTreeMap<PinId, PinView>,
        current: &BTreeMap<PinId, PinView>,
    ) -> Vec<PinId> {
        current
            .iter()
            .filter(|(id, view)| previous.get(id).map_or(true, |old| view.differs_from(old)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// A copy with each pin's most recent `count` history samples attached.
    /// Samples that fell out of the retention horizon by this snapshot's
    /// time are left out.
    pub fn with_history(&self, history: &HistoryStore, count: usize) -> Snapshot {
        let mut snapshot = self.clone();
        for (id, view) in snapshot.pins.iter_mut() {
            view.high_duration_history = Some(history.latest(*id, count, self.timestamp));
        }
        snapshot
    }

    pub fn pin(&self, id: PinId) -> Option<&PinView> {
        self.pins.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::Pin;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn setup() -> PinStateTracker {
        let pins = vec![Pin::new(4, "Door"), Pin::new(17, "Pump")];
        PinStateTracker::new(&pins, HistoryStore::new(Duration::from_secs(3600), 10))
    }

    #[test]
    fn test_capture_reports_running_high_duration() {
        let mut tracker = setup();
        tracker.observe(4, false, at(0));
        tracker.observe(17, false, at(0));
        tracker.observe(17, true, at(1));

        let snapshot = Snapshot::capture(&tracker, 1, at(4), None);
        let pump = snapshot.pin(17).unwrap();
        assert!(pump.state);
        assert_eq!(pump.current_high_duration, 3.0);
        assert_eq!(pump.transitions, 1);
        assert_eq!(pump.last_transition, Some(at(1)));
        assert_eq!(snapshot.pin(4).unwrap().current_high_duration, 0.0);
        assert_eq!(snapshot.changed, vec![4, 17]);
    }

    #[test]
    fn test_diff_only_flags_changed_pins() {
        let mut tracker = setup();
        tracker.observe(4, false, at(0));
        tracker.observe(17, true, at(0));
        let first = Snapshot::capture(&tracker, 1, at(0), None);

        tracker.observe(4, true, at(1));
        tracker.observe(17, true, at(1));
        let second = Snapshot::capture(&tracker, 2, at(1), Some(&first));

        // Pin 17's running duration grew but nothing else changed
        assert_eq!(second.changed, vec![4]);
    }

    #[test]
    fn test_history_only_on_request() {
        let mut tracker = setup();
        tracker.observe(4, true, at(0));
        tracker.observe(4, false, at(2));
        let snapshot = Snapshot::capture(&tracker, 1, at(2), None);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["pins"]["4"].get("high_duration_history").is_none());

        let detailed = snapshot.with_history(tracker.history(), 50);
        let history = detailed.pin(4).unwrap().high_duration_history.as_ref().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].duration, Duration::from_secs(2));
        assert_eq!(
            detailed.pin(17).unwrap().high_duration_history.as_deref(),
            Some(&[][..])
        );
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut tracker = setup();
        tracker.observe(4, false, at(0));
        let snapshot = Snapshot::capture(&tracker, 7, at(0), None);
        let json = serde_json::to_value(&snapshot).unwrap();

        let door = &json["pins"]["4"];
        assert_eq!(door["state"], false);
        assert_eq!(door["label"], "Door");
        assert_eq!(door["transitions"], 0);
        assert!(door["last_transition"].is_null());
        assert_eq!(json["tick"], 7);

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
