//! A sampler fed from a script of levels, for tests and replay.

use super::PinSampler;
use crate::error::{MonitorError, Result};
use crate::pins::PinId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
enum Step {
    Level(bool),
    Fault,
}

#[derive(Debug, Default)]
struct Line {
    queued: VecDeque<Step>,
    last: Option<bool>,
}

/// Returns queued levels in order, then repeats the last level read.
///
/// Clones share the same script, so a test can keep one handle and push
/// levels while the monitor owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSampler {
    lines: Arc<Mutex<HashMap<PinId, Line>>>,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue levels for `pin`.
    pub fn push_levels(&self, pin: PinId, levels: impl IntoIterator<Item = bool>) {
        let mut lines = self.lock();
        let line = lines.entry(pin).or_default();
        line.queued.extend(levels.into_iter().map(Step::Level));
    }

    /// Queue a failed read for `pin`.
    pub fn push_fault(&self, pin: PinId) {
        self.lock().entry(pin).or_default().queued.push_back(Step::Fault);
    }

    /// Drop anything queued and hold `pin` at `level`.
    pub fn hold(&self, pin: PinId, level: bool) {
        let mut lines = self.lock();
        let line = lines.entry(pin).or_default();
        line.queued.clear();
        line.last = Some(level);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PinId, Line>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PinSampler for ScriptedSampler {
    fn read(&mut self, pin: PinId) -> Result<bool> {
        let mut lines = self.lock();
        let line = lines
            .get_mut(&pin)
            .ok_or_else(|| MonitorError::gpio_error(format!("No script for pin {}", pin)))?;

        match line.queued.pop_front() {
            Some(Step::Level(level)) => {
                line.last = Some(level);
                Ok(level)
            }
            Some(Step::Fault) => Err(MonitorError::gpio_error(format!(
                "Scripted read failure on pin {}",
                pin
            ))),
            None => line
                .last
                .ok_or_else(|| MonitorError::gpio_error(format!("Script for pin {} is empty", pin))),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
