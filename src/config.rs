//! Monitor configuration: which lines to watch, how often, and how much
//! history to keep.
//!
//! The on-disk format is JSON. Every field is optional; a missing file
//! yields the default configuration (BCM pins 2..=27, 100ms polling,
//! one hour of history).

use crate::error::{MonitorError, Result};
use crate::pins::{Pin, PinId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Highest BCM line number exposed on the 40-pin header.
pub const MAX_BCM_PIN: i64 = 27;

/// Default sampling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 0.1;

/// Default retention horizon for HIGH-duration samples, in hours.
pub const DEFAULT_RETENTION_HOURS: f64 = 1.0;

/// Default per-pin cap on stored samples.
pub const DEFAULT_MAX_SAMPLES_PER_PIN: usize = 1000;

/// Default number of events buffered per subscriber before the oldest are dropped.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// A configured line as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PinEntry {
    /// BCM line number. Kept wide so out-of-range values reach validation.
    pub pin_id: i64,
    /// Display label; defaults to `GPIO <n>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PinEntry {
    pub fn new(pin_id: i64, label: impl Into<String>) -> Self {
        Self {
            pin_id,
            label: Some(label.into()),
        }
    }
}

/// Raw monitor configuration as loaded from disk or built in code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Lines to monitor, in display order
    pub pins: Vec<PinEntry>,
    /// Sampling interval in seconds
    pub poll_interval_seconds: f64,
    /// How long completed HIGH intervals are kept, in hours
    pub history_retention_hours: f64,
    /// Upper bound on stored samples per pin
    pub max_samples_per_pin: usize,
    /// Per-subscriber event buffer
    pub subscriber_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pins: (2..=MAX_BCM_PIN)
                .map(|pin_id| PinEntry {
                    pin_id,
                    label: None,
                })
                .collect(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            history_retention_hours: DEFAULT_RETENTION_HOURS,
            max_samples_per_pin: DEFAULT_MAX_SAMPLES_PER_PIN,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Validated configuration consumed by the monitor loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub pins: Vec<Pin>,
    pub poll_interval: Duration,
    pub retention: Duration,
    pub max_samples_per_pin: usize,
    pub subscriber_buffer: usize,
}

impl MonitorConfig {
    /// Load a configuration file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        debug!("Loaded {} pin entries from {:?}", config.pins.len(), path);
        Ok(config)
    }

    /// Replace the monitored pin list.
    pub fn with_pins(mut self, pins: Vec<PinEntry>) -> Self {
        self.pins = pins;
        self
    }

    /// Set the sampling interval in seconds.
    pub fn with_poll_interval(mut self, seconds: f64) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    /// Set the history retention horizon in hours.
    pub fn with_retention_hours(mut self, hours: f64) -> Self {
        self.history_retention_hours = hours;
        self
    }

    /// Set the per-pin sample cap.
    pub fn with_max_samples_per_pin(mut self, max: usize) -> Self {
        self.max_samples_per_pin = max;
        self
    }

    /// Set the per-subscriber buffer size.
    pub fn with_subscriber_buffer(mut self, size: usize) -> Self {
        self.subscriber_buffer = size;
        self
    }

    /// Validate and convert into the form the monitor runs on.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if self.pins.is_empty() {
            return Err(MonitorError::config_error("no pins configured"));
        }

        let mut seen = HashSet::new();
        let mut pins = Vec::with_capacity(self.pins.len());
        for entry in &self.pins {
            if !(0..=MAX_BCM_PIN).contains(&entry.pin_id) {
                return Err(MonitorError::config_error(format!(
                    "pin {} is outside the BCM range 0..={}",
                    entry.pin_id, MAX_BCM_PIN
                )));
            }
            let id = entry.pin_id as PinId;
            if !seen.insert(id) {
                return Err(MonitorError::config_error(format!(
                    "pin {} is configured more than once",
                    id
                )));
            }
            let label = match &entry.label {
                Some(label) if !label.trim().is_empty() => label.clone(),
                _ => Pin::default_label(id),
            };
            pins.push(Pin::new(id, label));
        }

        let poll_interval = positive_duration(self.poll_interval_seconds, "poll_interval_seconds")?;
        let retention = positive_duration(
            self.history_retention_hours * 3600.0,
            "history_retention_hours",
        )?;

        if self.max_samples_per_pin == 0 {
            return Err(MonitorError::config_error(
                "max_samples_per_pin must be greater than zero",
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(MonitorError::config_error(
                "subscriber_buffer must be greater than zero",
            ));
        }

        Ok(ResolvedConfig {
            pins,
            poll_interval,
            retention,
            max_samples_per_pin: self.max_samples_per_pin,
            subscriber_buffer: self.subscriber_buffer,
        })
    }
}

fn positive_duration(seconds: f64, field: &str) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(MonitorError::config_error(format!(
            "{} must be a finite number greater than zero",
            field
        )));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| MonitorError::config_error(format!("{} is out of range: {}", field, e)))
}

impl ResolvedConfig {
    /// Drop pins that the sampler could not claim, keeping order.
    pub fn retain_pins(&mut self, available: &[PinId]) {
        self.pins.retain(|pin| available.contains(&pin.id));
    }

    pub fn pin_ids(&self) -> Vec<PinId> {
        self.pins.iter().map(|pin| pin.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_resolves() {
        let resolved = MonitorConfig::default().resolve().unwrap();
        assert_eq!(resolved.pins.len(), 26);
        assert_eq!(resolved.pins[0].id, 2);
        assert_eq!(resolved.pins[0].label, "GPIO 2");
        assert_eq!(resolved.poll_interval, Duration::from_millis(100));
        assert_eq!(resolved.retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        let config = MonitorConfig::default().with_pins(vec![
            PinEntry::new(17, "Door"),
            PinEntry::new(17, "Window"),
        ]);
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_out_of_range_pin_rejected() {
        for bad in [-1, 28, 300] {
            let config = MonitorConfig::default().with_pins(vec![PinEntry::new(bad, "x")]);
            assert!(matches!(config.resolve(), Err(MonitorError::Config(_))));
        }
    }

    #[test]
    fn test_invalid_intervals_rejected() {
        for interval in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let config = MonitorConfig::default().with_poll_interval(interval);
            assert!(config.resolve().is_err(), "interval {} accepted", interval);
        }
        let config = MonitorConfig::default().with_retention_hours(0.0);
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_empty_pin_list_rejected() {
        let config = MonitorConfig::default().with_pins(Vec::new());
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_blank_label_gets_default() {
        let config = MonitorConfig::default().with_pins(vec![
            PinEntry::new(4, "  "),
            PinEntry {
                pin_id: 5,
                label: None,
            },
        ]);
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.pins[0].label, "GPIO 4");
        assert_eq!(resolved.pins[1].label, "GPIO 5");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"pins": [{{"pin_id": 17, "label": "Pump"}}], "poll_interval_seconds": 0.5}}"#
        )
        .unwrap();

        let config = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.pins, vec![PinEntry::new(17, "Pump")]);
        assert_eq!(config.poll_interval_seconds, 0.5);
        assert_eq!(config.history_retention_hours, DEFAULT_RETENTION_HOURS);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            MonitorConfig::load(file.path()),
            Err(MonitorError::Parse(_))
        ));
    }

    #[test]
    fn test_retain_pins() {
        let mut resolved = MonitorConfig::default()
            .with_pins(vec![PinEntry::new(4, "a"), PinEntry::new(17, "b")])
            .resolve()
            .unwrap();
        resolved.retain_pins(&[17]);
        assert_eq!(resolved.pin_ids(), vec![17]);
    }
}
