//! The sampling loop and the handle used to talk to it.
//!
//! One task owns the [`PinStateTracker`](crate::pins::PinStateTracker) and
//! drives it at a fixed interval; everything else interacts through a
//! [`MonitorHandle`] by message passing or by reading published snapshots.

mod handle;
mod runner;

pub use handle::MonitorHandle;
pub use runner::{MonitorLoop, MonitorStatus};

use crate::broadcast::EventBroadcaster;
use crate::config::ResolvedConfig;
use crate::gpio::PinSampler;
use crate::pins::{HistoryStore, PinStateTracker};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Control requests queue up behind at most this many others.
const COMMAND_BUFFER: usize = 16;

/// Build a monitor loop for `config` reading from `sampler`, plus a handle
/// to control it. The loop does nothing until [`MonitorLoop::run`] is awaited.
pub fn create<S: PinSampler>(config: &ResolvedConfig, sampler: S) -> (MonitorLoop<S>, MonitorHandle) {
    let history = HistoryStore::new(config.retention, config.max_samples_per_pin);
    let broadcaster = EventBroadcaster::new(config.subscriber_buffer, history.clone());
    let tracker = PinStateTracker::new(&config.pins, history);

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(MonitorStatus::Stopped);
    let cancel = CancellationToken::new();

    let monitor = MonitorLoop::new(
        sampler,
        tracker,
        broadcaster.clone(),
        config.poll_interval,
        command_rx,
        status_tx,
        cancel.clone(),
    );
    let handle = MonitorHandle::new(
        command_tx,
        broadcaster,
        status_rx,
        cancel,
        Arc::new(config.clone()),
    );
    (monitor, handle)
}

/// Create the loop and run it on a new task.
pub fn spawn<S: PinSampler + 'static>(
    config: &ResolvedConfig,
    sampler: S,
) -> (MonitorHandle, tokio::task::JoinHandle<()>) {
    let (monitor, handle) = create(config, sampler);
    let task = tokio::spawn(monitor.run());
    (handle, task)
}
