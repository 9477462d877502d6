//! Pin-state tracking: per-line edge detection, HIGH-duration history and
//! immutable snapshots of the whole pin table.
//!
//! All mutation happens on the monitor task; everything handed out of this
//! module is either an owned copy or an immutable [`Snapshot`].

pub mod history;
pub mod snapshot;
pub mod tracker;

pub use history::{HistorySample, HistoryStore};
pub use snapshot::{PinView, Snapshot};
pub use tracker::{Edge, PinState, PinStateTracker, TransitionEvent};

use serde::{Deserialize, Serialize};

/// BCM line number.
pub type PinId = u8;

/// A monitored digital input. Lines are treated as active-high.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub label: String,
}

impl Pin {
    pub fn new(id: PinId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    /// Label used when the configuration does not name a line.
    pub fn default_label(id: PinId) -> String {
        format!("GPIO {}", id)
    }
}

/// Serialize a [`std::time::Duration`] as fractional seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Elapsed time between two wall-clock instants, clamped at zero.
pub(crate) fn elapsed_between(
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> std::time::Duration {
    (end - start).to_std().unwrap_or_default()
}
