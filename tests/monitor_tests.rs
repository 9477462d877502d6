use pinwatch::{
    monitor, Edge, MonitorConfig, MonitorError, MonitorEvent, MonitorStatus, PinEntry, PinId,
    PinSampler, ResolvedConfig, ScriptedSampler, Snapshot, Subscription, TransitionEvent,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn config(pins: &[u8], buffer: usize) -> ResolvedConfig {
    MonitorConfig::default()
        .with_pins(
            pins.iter()
                .map(|&id| PinEntry::new(i64::from(id), format!("Input {}", id)))
                .collect(),
        )
        .with_poll_interval(1.0)
        .with_subscriber_buffer(buffer)
        .resolve()
        .expect("Should resolve test config")
}

/// Drain events up to and including the snapshot for `tick`, returning it
/// together with every transition seen on the way.
async fn until_tick(
    subscription: &mut Subscription,
    tick: u64,
) -> (Arc<Snapshot>, Vec<TransitionEvent>) {
    let mut transitions = Vec::new();
    loop {
        match subscription.recv().await {
            Some(MonitorEvent::Snapshot(snapshot)) if snapshot.tick == tick => {
                return (snapshot, transitions)
            }
            Some(MonitorEvent::Transition(event)) => transitions.push(event),
            Some(_) => {}
            None => panic!("monitor stopped before tick {}", tick),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_edges_counted_and_high_interval_recorded() {
    let sampler = ScriptedSampler::new();
    sampler.push_levels(17, [false, true, true, false]);

    let (monitor_loop, handle) = monitor::create(&config(&[17], 64), sampler.clone());
    let mut subscription = handle.subscribe();
    let task = tokio::spawn(monitor_loop.run());

    let (baseline, _) = until_tick(&mut subscription, 0).await;
    let start = baseline.timestamp;
    assert_eq!(baseline.pin(17).unwrap().transitions, 0);
    assert!(!baseline.pin(17).unwrap().state);

    // Snapshot of a tick arrives before that tick's transitions
    let (tick1, _) = until_tick(&mut subscription, 1).await;
    assert!(tick1.pin(17).unwrap().state);
    assert_eq!(tick1.changed, vec![17]);

    let (_, transitions) = until_tick(&mut subscription, 4).await;
    assert_eq!(transitions.len(), 2);

    let rising = &transitions[0];
    assert_eq!(rising.edge(), Edge::Rising);
    assert_eq!(rising.timestamp - start, chrono::Duration::seconds(1));
    assert_eq!(rising.transition_count, 1);
    assert!(rising.completed_duration.is_none());

    let falling = &transitions[1];
    assert_eq!(falling.edge(), Edge::Falling);
    assert_eq!(falling.timestamp - start, chrono::Duration::seconds(3));
    assert_eq!(falling.transition_count, 2);
    assert_eq!(falling.completed_duration, Some(Duration::from_secs(2)));

    let now = falling.timestamp;
    let history = handle.broadcaster().query_history_at(17, 1, now);
    assert_eq!(history.history.len(), 1);
    assert_eq!(history.history[0].duration, Duration::from_secs(2));
    assert!(handle.broadcaster().query_history_at(17, 0, now).history.is_empty());
    assert!(handle.broadcaster().query_history_at(4, 1, now).history.is_empty());

    assert_eq!(handle.transition_summary().get(&17), Some(&2));

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_late_subscriber_gets_no_replay() {
    let sampler = ScriptedSampler::new();
    sampler.hold(5, true);

    let (monitor_loop, handle) = monitor::create(&config(&[5], 64), sampler);
    let mut early = handle.subscribe();
    let task = tokio::spawn(monitor_loop.run());

    until_tick(&mut early, 2).await;
    assert_eq!(handle.latest_snapshot().unwrap().tick, 2);

    let mut late = handle.subscribe();
    match late.recv().await {
        Some(MonitorEvent::Snapshot(snapshot)) => assert_eq!(snapshot.tick, 3),
        other => panic!("unexpected first event: {:?}", other),
    }

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_subscriber_does_not_stall_monitor() {
    let sampler = ScriptedSampler::new();
    sampler.hold(22, false);

    let (monitor_loop, handle) = monitor::create(&config(&[22], 4), sampler);
    let mut slow = handle.subscribe();
    let mut fast = handle.subscribe();
    let task = tokio::spawn(monitor_loop.run());

    let (snapshot, _) = until_tick(&mut fast, 20).await;
    assert_eq!(snapshot.tick, 20);

    // The slow subscriber only sees the most recent events
    match slow.recv().await {
        Some(MonitorEvent::Snapshot(snapshot)) => assert!(snapshot.tick > 10),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(slow.dropped() > 0);
    assert_eq!(fast.dropped(), 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_counters_and_history() {
    let sampler = ScriptedSampler::new();
    sampler.push_levels(17, [false, true, false]);

    let (monitor_loop, handle) = monitor::create(&config(&[17], 64), sampler.clone());
    let mut subscription = handle.subscribe();
    let task = tokio::spawn(monitor_loop.run());

    let (snapshot, _) = until_tick(&mut subscription, 2).await;
    assert_eq!(snapshot.pin(17).unwrap().transitions, 2);
    assert_eq!(handle.broadcaster().history().len(17), 1);

    handle.reset().await.expect("Reset should be acknowledged");
    sampler.push_levels(17, [true]);

    loop {
        match subscription.recv().await {
            Some(MonitorEvent::CountersReset { .. }) => break,
            Some(_) => {}
            None => panic!("monitor stopped"),
        }
    }
    match subscription.recv().await {
        Some(MonitorEvent::Snapshot(snapshot)) => {
            assert_eq!(snapshot.tick, 2);
            let view = snapshot.pin(17).unwrap();
            assert_eq!(view.transitions, 0);
            assert!(view.last_transition.is_none());
        }
        other => panic!("expected snapshot after reset, got {:?}", other),
    }
    assert!(handle.broadcaster().history().is_empty(17));

    let (_, transitions) = until_tick(&mut subscription, 4).await;
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].edge(), Edge::Rising);
    assert_eq!(transitions[0].transition_count, 1);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_read_fault_keeps_last_level() {
    let sampler = ScriptedSampler::new();
    sampler.push_levels(27, [true]);
    sampler.push_fault(27);
    sampler.push_levels(27, [true]);
    sampler.hold(6, false);

    let (monitor_loop, handle) = monitor::create(&config(&[6, 27], 64), sampler);
    let mut subscription = handle.subscribe();
    let task = tokio::spawn(monitor_loop.run());

    let (faulted, transitions) = until_tick(&mut subscription, 1).await;
    let view = faulted.pin(27).unwrap();
    assert!(view.state);
    assert!(view.stale);
    assert_eq!(view.read_errors, 1);
    assert!(!faulted.pin(6).unwrap().stale);

    let (recovered, later) = until_tick(&mut subscription, 2).await;
    let view = recovered.pin(27).unwrap();
    assert!(view.state);
    assert!(!view.stale);
    assert_eq!(view.transitions, 0);
    assert!(transitions.is_empty() && later.is_empty());

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_loop() {
    let sampler = ScriptedSampler::new();
    sampler.hold(17, false);

    let (monitor_loop, handle) = monitor::create(&config(&[17], 64), sampler);
    let mut subscription = handle.subscribe();
    assert_eq!(handle.status(), MonitorStatus::Stopped);
    let task = tokio::spawn(monitor_loop.run());

    until_tick(&mut subscription, 0).await;
    assert_eq!(handle.status(), MonitorStatus::Running);

    handle.shutdown();
    while subscription.recv().await.is_some() {}
    task.await.unwrap();

    assert_eq!(handle.status(), MonitorStatus::Stopped);
    assert!(matches!(handle.reset().await, Err(MonitorError::Shutdown)));
    assert!(subscription.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscribing_after_shutdown_ends_immediately() {
    let sampler = ScriptedSampler::new();
    sampler.hold(17, false);

    let (handle, task) = monitor::spawn(&config(&[17], 64), sampler);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.shutdown();
    task.await.unwrap();

    let mut late = handle.subscribe();
    let next = tokio::time::timeout(Duration::from_secs(3600), late.recv()).await;
    assert!(matches!(next, Ok(None)));
}

/// Blocks for `slow_for` on each of the first `slow_reads` reads and records
/// when every read started.
struct StallingSampler {
    slow_reads: usize,
    slow_for: Duration,
    reads: Arc<Mutex<Vec<Instant>>>,
}

impl PinSampler for StallingSampler {
    fn read(&mut self, _pin: PinId) -> pinwatch::Result<bool> {
        let mut reads = self.reads.lock().unwrap();
        reads.push(Instant::now());
        let stall = reads.len() <= self.slow_reads;
        drop(reads);
        if stall {
            std::thread::sleep(self.slow_for);
        }
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overrun_does_not_burst_catch_up() {
    let interval = Duration::from_millis(20);
    let reads = Arc::new(Mutex::new(Vec::new()));
    let sampler = StallingSampler {
        slow_reads: 5,
        slow_for: Duration::from_millis(60),
        reads: Arc::clone(&reads),
    };
    let config = MonitorConfig::default()
        .with_pins(vec![PinEntry::new(17, "Slow")])
        .with_poll_interval(interval.as_secs_f64())
        .resolve()
        .unwrap();

    let (handle, task) = monitor::spawn(&config, sampler);
    tokio::time::sleep(Duration::from_millis(700)).await;
    handle.shutdown();
    task.await.unwrap();

    let reads = reads.lock().unwrap().clone();
    assert!(reads.len() > 10, "loop stalled: {} ticks", reads.len());

    // While stalled, ticks run back to back at the read time
    for pair in reads[..5].windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(60));
    }

    // Afterwards the missed ticks are not replayed: at most the one tick
    // that was already due fires without waiting
    let fast = &reads[5..];
    let bunched = fast
        .windows(2)
        .filter(|pair| pair[1] - pair[0] < interval / 2)
        .count();
    assert!(bunched <= 1, "{} ticks fired back to back", bunched);

    let window = *fast.last().unwrap() - fast[0];
    let expected = window.as_millis() / interval.as_millis() + 2;
    assert!(fast.len() as u128 <= expected, "{} ticks in {:?}", fast.len(), window);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_monitor_publishes_latest_snapshot() {
    let sampler = ScriptedSampler::new();
    sampler.hold(3, true);

    let (handle, task) = monitor::spawn(&config(&[3], 64), sampler);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let latest = handle.latest_snapshot().expect("Should have a snapshot");
    assert_eq!(latest.tick, 2);
    let view = latest.pin(3).unwrap();
    assert!(view.state);
    assert!((view.current_high_duration - 2.0).abs() < 1e-6);

    handle.shutdown();
    task.await.unwrap();
}
