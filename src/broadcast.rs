//! Fan-out of snapshots and transitions to dashboard subscribers.
//!
//! Every subscriber reads from its own cursor into a bounded
//! [`tokio::sync::broadcast`] ring. Publishing never waits: a subscriber
//! that falls more than the buffer size behind loses its oldest events and
//! is told how many it missed, while everyone else, and the monitor loop,
//! carry on.

use crate::pins::{HistorySample, HistoryStore, PinId, Snapshot, TransitionEvent};
use chrono::{DateTime, Utc};
use futures_util::future::Either;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An update pushed to every subscriber, in publish order.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Full pin table at a tick boundary
    Snapshot(Arc<Snapshot>),
    /// A single edge observed during the tick the preceding snapshot describes
    Transition(TransitionEvent),
    /// All counters and history were cleared
    CountersReset { timestamp: DateTime<Utc> },
    /// The monitor loop stopped; no further events follow
    Shutdown,
}

/// Response to an on-demand history request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinHistory {
    pub pin: PinId,
    pub history: Vec<HistorySample>,
}

/// Publishes monitor events to any number of subscribers and serves
/// history queries. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<MonitorEvent>,
    latest: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
    history: HistoryStore,
    subscribers: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `buffer` events per subscriber.
    pub fn new(buffer: usize, history: HistoryStore) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        let (latest, _) = watch::channel(None);
        Self {
            tx,
            latest: Arc::new(latest),
            history,
            subscribers: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a new subscriber. Only events published after this call
    /// are delivered. Once shutdown has been published the subscription
    /// starts out closed.
    pub fn subscribe(&self) -> Subscription {
        // Receiver first: a shutdown racing with this call is either seen
        // by the flag or delivered through the receiver.
        let rx = self.tx.subscribe();
        let closed = self.closed.load(Ordering::SeqCst);
        let count = self.subscribers.fetch_add(1, Ordering::Relaxed) + 1;
        let id = Uuid::new_v4();
        info!(subscriber = %id, active = count, closed, "subscriber registered");
        Subscription {
            id,
            rx,
            dropped: 0,
            closed,
            _guard: SubscriberGuard {
                id,
                count: Arc::clone(&self.subscribers),
            },
        }
    }

    /// Deliver a snapshot to every live subscriber and remember it as the
    /// latest one.
    pub fn publish_snapshot(&self, snapshot: Arc<Snapshot>) -> usize {
        self.latest.send_replace(Some(Arc::clone(&snapshot)));
        self.send(MonitorEvent::Snapshot(snapshot))
    }

    /// Deliver a transition to every live subscriber.
    pub fn publish_transition(&self, event: TransitionEvent) -> usize {
        self.send(MonitorEvent::Transition(event))
    }

    /// Announce that counters were cleared.
    pub fn publish_reset(&self, timestamp: DateTime<Utc>) -> usize {
        self.send(MonitorEvent::CountersReset { timestamp })
    }

    /// Tell subscribers the stream has ended. Later subscriptions are
    /// closed from the start.
    pub fn publish_shutdown(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.send(MonitorEvent::Shutdown)
    }

    /// Whether shutdown has been published.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, event: MonitorEvent) -> usize {
        // An error only means nobody is listening right now
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("no subscribers for event");
                0
            }
        }
    }

    /// Most recently published snapshot, if any.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }

    /// Completed HIGH intervals of `pin` from the last `hours` hours.
    pub fn query_history(&self, pin: PinId, hours: u32) -> PinHistory {
        self.query_history_at(pin, hours, Utc::now())
    }

    /// Like [`query_history`](Self::query_history) with an explicit `now`.
    pub fn query_history_at(&self, pin: PinId, hours: u32, now: DateTime<Utc>) -> PinHistory {
        PinHistory {
            pin,
            history: self.history.query_hours(pin, hours, now),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Number of registered subscriptions that have not been dropped.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct SubscriberGuard {
    id: Uuid,
    count: Arc<AtomicUsize>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let active = self.count.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        info!(subscriber = %self.id, active, "subscriber retired");
    }
}

/// One subscriber's view of the event stream. Dropping it retires the
/// subscription.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: broadcast::Receiver<MonitorEvent>,
    dropped: u64,
    closed: bool,
    _guard: SubscriberGuard,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Events this subscriber missed because it fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Wait for the next event. Returns `None` once the monitor has shut down.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        if self.closed {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return self.accept(event),
                Err(broadcast::error::RecvError::Lagged(n)) => self.record_lag(n),
                Err(broadcast::error::RecvError::Closed) => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// Take the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        if self.closed {
            return None;
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => return self.accept(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// Convert into a stream that ends at shutdown. Lag is logged and skipped.
    pub fn into_stream(self) -> impl Stream<Item = MonitorEvent> + Send + 'static {
        let Subscription {
            id,
            rx,
            closed,
            _guard,
            ..
        } = self;
        if closed {
            return Either::Left(futures_util::stream::empty());
        }
        let events = BroadcastStream::new(rx)
            .filter_map(move |item| {
                let _ = &_guard;
                match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        warn!(subscriber = %id, skipped = n, "subscriber lagged");
                        None
                    }
                }
            })
            .take_while(|event| !matches!(event, MonitorEvent::Shutdown));
        Either::Right(events)
    }

    fn accept(&mut self, event: MonitorEvent) -> Option<MonitorEvent> {
        if matches!(event, MonitorEvent::Shutdown) {
            self.closed = true;
            return None;
        }
        Some(event)
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        warn!(subscriber = %self.id, skipped, "subscriber lagged, oldest events dropped");
    }
}
