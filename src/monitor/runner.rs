//! Fixed-interval sampling loop.

use crate::broadcast::EventBroadcaster;
use crate::error::Result;
use crate::gpio::PinSampler;
use crate::pins::{PinId, PinStateTracker, Snapshot, TransitionEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a monitor loop. A loop runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Stopped,
    Running,
}

pub(crate) enum Command {
    Reset {
        ack: oneshot::Sender<DateTime<Utc>>,
    },
    UpdateLabels {
        labels: BTreeMap<PinId, String>,
        ack: oneshot::Sender<Result<Vec<PinId>>>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Reset { .. } => f.write_str("Reset"),
            Command::UpdateLabels { labels, .. } => {
                f.debug_struct("UpdateLabels").field("labels", labels).finish()
            }
        }
    }
}

/// Wall-clock time derived from tokio's monotonic clock, so timestamps
/// never go backwards and follow paused time in tests.
struct Clock {
    wall: DateTime<Utc>,
    start: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            wall: Utc::now(),
            start: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Owns every pin's state and drives sampler -> tracker -> broadcaster.
pub struct MonitorLoop<S> {
    sampler: S,
    tracker: PinStateTracker,
    pins: Vec<PinId>,
    broadcaster: EventBroadcaster,
    interval: Duration,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<MonitorStatus>,
    cancel: CancellationToken,
    tick: u64,
    previous: Option<Arc<Snapshot>>,
}

impl<S: PinSampler> MonitorLoop<S> {
    pub(crate) fn new(
        sampler: S,
        tracker: PinStateTracker,
        broadcaster: EventBroadcaster,
        interval: Duration,
        commands: mpsc::Receiver<Command>,
        status: watch::Sender<MonitorStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sampler,
            pins: tracker.pin_ids().to_vec(),
            tracker,
            broadcaster,
            interval,
            commands,
            status,
            cancel,
            tick: 0,
            previous: None,
        }
    }

    /// Run until cancelled.
    ///
    /// The first sample of every pin is taken immediately as a baseline and
    /// published as tick 0; regular ticks follow every interval. Reset
    /// requests are handled between ticks, never during one.
    pub async fn run(mut self) {
        if self.cancel.is_cancelled() {
            debug!("monitor cancelled before start");
            self.broadcaster.publish_shutdown();
            return;
        }

        let clock = Clock::new();
        self.status.send_replace(MonitorStatus::Running);
        info!(
            sampler = self.sampler.name(),
            pins = self.pins.len(),
            interval_ms = self.interval.as_millis() as u64,
            "pin monitor started"
        );

        self.run_tick(clock.now());

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command, clock.now()),
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick += 1;
                    self.run_tick(clock.now());

                    let elapsed = started.elapsed();
                    if elapsed > self.interval {
                        warn!(
                            tick = self.tick,
                            elapsed_ms = elapsed.as_millis() as u64,
                            interval_ms = self.interval.as_millis() as u64,
                            "tick overran poll interval"
                        );
                    }
                }
            }
        }

        self.broadcaster.publish_shutdown();
        self.status.send_replace(MonitorStatus::Stopped);
        info!(ticks = self.tick, "pin monitor stopped");
    }

    /// Sample every pin once, then publish the snapshot followed by the
    /// tick's transitions.
    fn run_tick(&mut self, now: DateTime<Utc>) {
        let mut events: Vec<TransitionEvent> = Vec::new();

        for &pin in &self.pins {
            match self.sampler.read(pin) {
                Ok(level) => {
                    if let Some(event) = self.tracker.observe(pin, level, now) {
                        events.push(event);
                    }
                }
                Err(e) => self.tracker.record_read_error(pin, &e),
            }
        }

        let snapshot = self.capture(now);
        if !snapshot.changed.is_empty() {
            debug!(tick = self.tick, changed = ?snapshot.changed, "pins changed");
        }
        self.broadcaster.publish_snapshot(snapshot);
        for event in events {
            self.broadcaster.publish_transition(event);
        }
    }

    fn capture(&mut self, now: DateTime<Utc>) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot::capture(
            &self.tracker,
            self.tick,
            now,
            self.previous.as_deref(),
        ));
        self.previous = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn handle_command(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::Reset { ack } => {
                self.tracker.reset();
                info!(tick = self.tick, "all counters reset");
                self.broadcaster.publish_reset(now);
                let snapshot = self.capture(now);
                self.broadcaster.publish_snapshot(snapshot);
                // The requester may have given up waiting
                let _ = ack.send(now);
            }
            Command::UpdateLabels { labels, ack } => {
                let result = self.tracker.relabel(&labels);
                if let Ok(changed) = &result {
                    if !changed.is_empty() {
                        info!(pins = ?changed, "pin labels updated");
                        let snapshot = self.capture(now);
                        self.broadcaster.publish_snapshot(snapshot);
                    }
                }
                let _ = ack.send(result);
            }
        }
    }
}
