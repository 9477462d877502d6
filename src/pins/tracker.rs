//! Per-pin edge detection and transition bookkeeping.

use super::{duration_secs, elapsed_between, HistorySample, HistoryStore, Pin, PinId};
use crate::error::{MonitorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Direction of an observed level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// LOW -> HIGH
    Rising,
    /// HIGH -> LOW
    Falling,
}

/// A single observed level change on one pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub pin: PinId,
    pub from: bool,
    pub to: bool,
    pub timestamp: DateTime<Utc>,
    /// Length of the HIGH interval that just ended (falling edges only)
    #[serde(
        default,
        with = "optional_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_duration: Option<Duration>,
    /// Transition count after this edge
    pub transition_count: u64,
}

impl TransitionEvent {
    pub fn edge(&self) -> Edge {
        if self.to {
            Edge::Rising
        } else {
            Edge::Falling
        }
    }
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => super::duration_secs::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Mutable state of one line. Owned by [`PinStateTracker`].
///
/// `high_since` is `Some` exactly when `current_level` is HIGH.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PinState {
    pub label: String,
    pub current_level: bool,
    pub transition_count: u64,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub high_since: Option<DateTime<Utc>>,
    #[serde(with = "duration_secs")]
    pub current_high_duration: Duration,
    /// Total failed reads since start or last reset
    pub read_errors: u64,
    /// The most recent read failed; `current_level` is the last known value
    pub stale: bool,
    #[serde(skip)]
    consecutive_errors: u64,
    #[serde(skip)]
    seeded: bool,
}

impl PinState {
    fn new(label: String) -> Self {
        Self {
            label,
            current_level: false,
            transition_count: 0,
            last_transition_at: None,
            high_since: None,
            current_high_duration: Duration::ZERO,
            read_errors: 0,
            stale: false,
            consecutive_errors: 0,
            seeded: false,
        }
    }

    /// Whether a baseline level has been read yet.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// How long the line has been HIGH as of `now`; zero while LOW.
    pub fn high_duration_at(&self, now: DateTime<Utc>) -> Duration {
        self.high_since
            .map(|since| elapsed_between(since, now))
            .unwrap_or_default()
    }
}

/// Edge detector and counter for every configured pin.
///
/// Not `Sync`-shared: a single task owns the tracker and calls
/// [`observe`](Self::observe) once per pin per tick.
#[derive(Debug)]
pub struct PinStateTracker {
    states: BTreeMap<PinId, PinState>,
    order: Vec<PinId>,
    history: HistoryStore,
}

impl PinStateTracker {
    pub fn new(pins: &[Pin], history: HistoryStore) -> Self {
        let states = pins
            .iter()
            .map(|pin| (pin.id, PinState::new(pin.label.clone())))
            .collect();
        Self {
            states,
            order: pins.iter().map(|pin| pin.id).collect(),
            history,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Configured pins in configuration order.
    pub fn pin_ids(&self) -> &[PinId] {
        &self.order
    }

    pub fn state(&self, pin: PinId) -> Option<&PinState> {
        self.states.get(&pin)
    }

    pub fn states(&self) -> impl Iterator<Item = (PinId, &PinState)> {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    /// Feed one successful read of `pin`.
    ///
    /// The first read of a pin only seeds its level. After that, any change
    /// of level is an edge: the counter is bumped and, on a falling edge,
    /// the completed HIGH interval is appended to the history store.
    pub fn observe(&mut self, pin: PinId, level: bool, now: DateTime<Utc>) -> Option<TransitionEvent> {
        let Some(state) = self.states.get_mut(&pin) else {
            debug!(pin, "observation for unconfigured pin ignored");
            return None;
        };

        if state.consecutive_errors > 0 {
            debug!(pin, failures = state.consecutive_errors, "pin readable again");
        }
        state.stale = false;
        state.consecutive_errors = 0;

        if !state.seeded {
            state.seeded = true;
            state.current_level = level;
            state.high_since = level.then_some(now);
            state.current_high_duration = Duration::ZERO;
            debug!(pin, level, "baseline level seeded");
            return None;
        }

        if level == state.current_level {
            state.current_high_duration = state.high_duration_at(now);
            return None;
        }

        let from = state.current_level;
        state.current_level = level;
        state.transition_count += 1;
        state.last_transition_at = Some(now);

        let completed_duration = if level {
            state.high_since = Some(now);
            state.current_high_duration = Duration::ZERO;
            None
        } else {
            let duration = state.high_duration_at(now);
            state.high_since = None;
            state.current_high_duration = Duration::ZERO;
            self.history.append(pin, HistorySample::new(now, duration));
            Some(duration)
        };

        debug!(
            pin,
            from,
            to = level,
            count = state.transition_count,
            "pin transition"
        );

        Some(TransitionEvent {
            pin,
            from,
            to: level,
            timestamp: now,
            completed_duration,
            transition_count: state.transition_count,
        })
    }

    /// Record a failed read. The last known level is kept and no edge is
    /// produced; the read is retried on the next tick.
    pub fn record_read_error(&mut self, pin: PinId, error: &dyn std::fmt::Display) {
        let Some(state) = self.states.get_mut(&pin) else {
            return;
        };
        state.read_errors += 1;
        state.consecutive_errors += 1;
        state.stale = true;

        if state.consecutive_errors == 1 {
            warn!(pin, "failed to read pin, keeping last known level: {}", error);
        } else {
            debug!(pin, failures = state.consecutive_errors, "pin still unreadable: {}", error);
        }
    }

    /// Clear counters and history for every pin.
    ///
    /// Current levels and any in-progress HIGH interval are kept so the next
    /// edge is counted as the first one.
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            state.transition_count = 0;
            state.last_transition_at = None;
            state.read_errors = 0;
        }
        self.history.clear();
    }

    /// Replace the labels of the given pins. Nothing is applied unless every
    /// pin is configured and every label is non-blank.
    pub fn relabel(&mut self, labels: &BTreeMap<PinId, String>) -> Result<Vec<PinId>> {
        for (pin, label) in labels {
            if !self.states.contains_key(pin) {
                return Err(MonitorError::config_error(format!("pin {} is not monitored", pin)));
            }
            if label.trim().is_empty() {
                return Err(MonitorError::config_error(format!("label for pin {} is empty", pin)));
            }
        }

        let mut changed = Vec::new();
        for (pin, label) in labels {
            if let Some(state) = self.states.get_mut(pin) {
                if state.label != *label {
                    debug!(pin, from = %state.label, to = %label, "pin relabelled");
                    state.label = label.clone();
                    changed.push(*pin);
                }
            }
        }
        Ok(changed)
    }
}
