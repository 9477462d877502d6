//! Cloneable control surface for a running monitor.

use super::runner::{Command, MonitorStatus};
use crate::broadcast::{EventBroadcaster, PinHistory, Subscription};
use crate::config::ResolvedConfig;
use crate::error::{MonitorError, Result};
use crate::pins::{PinId, Snapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Talks to a [`MonitorLoop`](super::MonitorLoop) without touching its state.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    broadcaster: EventBroadcaster,
    status: watch::Receiver<MonitorStatus>,
    cancel: CancellationToken,
    config: Arc<ResolvedConfig>,
}

impl MonitorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        broadcaster: EventBroadcaster,
        status: watch::Receiver<MonitorStatus>,
        cancel: CancellationToken,
        config: Arc<ResolvedConfig>,
    ) -> Self {
        Self {
            commands,
            broadcaster,
            status,
            cancel,
            config,
        }
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.broadcaster.latest_snapshot()
    }

    pub fn query_history(&self, pin: PinId, hours: u32) -> PinHistory {
        self.broadcaster.query_history(pin, hours)
    }

    /// `pin -> transitions` from the latest snapshot.
    pub fn transition_summary(&self) -> BTreeMap<PinId, u64> {
        self.latest_snapshot()
            .map(|snapshot| {
                snapshot
                    .pins
                    .iter()
                    .map(|(id, view)| (*id, view.transitions))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clear every pin's counters and history.
    ///
    /// The loop applies the reset between two ticks, publishes a
    /// `CountersReset` event and a fresh snapshot, then answers with the
    /// time the reset took effect.
    pub async fn reset(&self) -> Result<DateTime<Utc>> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Reset { ack })
            .await
            .map_err(|_| MonitorError::Shutdown)?;
        done.await.map_err(|_| MonitorError::Shutdown)
    }

    /// Rename monitored pins at runtime. Fails without applying anything if
    /// a pin is not monitored or a label is blank. Returns the pins whose
    /// label actually changed; those are flagged in the next snapshot.
    pub async fn update_labels(&self, labels: BTreeMap<PinId, String>) -> Result<Vec<PinId>> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::UpdateLabels { labels, ack })
            .await
            .map_err(|_| MonitorError::Shutdown)?;
        done.await.map_err(|_| MonitorError::Shutdown)?
    }

    /// Current label of every monitored pin. Runtime renames are picked up
    /// from the latest snapshot.
    pub fn labels(&self) -> BTreeMap<PinId, String> {
        match self.latest_snapshot() {
            Some(snapshot) => snapshot
                .pins
                .iter()
                .map(|(id, view)| (*id, view.label.clone()))
                .collect(),
            None => self
                .config
                .pins
                .iter()
                .map(|pin| (pin.id, pin.label.clone()))
                .collect(),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        *self.status.borrow()
    }

    /// Ask the loop to stop before its next tick.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Resolves once shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        self.cancel.cancelled().await
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }
}
