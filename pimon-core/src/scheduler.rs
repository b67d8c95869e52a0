/**
 * SCHEDULER - Boucles de collecte indépendantes avec arrêt coopératif
 *
 * ROLE:
 * Runs one tokio task per collector: wait stagger → loop { tick; sleep interval }.
 * A failing or slow collector never delays another one: each has its own task,
 * and blocking acquisitions inside a tick are pushed to the blocking pool or
 * to child processes by the sources themselves.
 *
 * ERREURS:
 * A failed (or panicked) tick is logged and recorded on the [`StatusBoard`],
 * nothing is published, nothing is retried early. Staleness of the affected keys is the
 * only signal readers see.
 *
 * ARRET:
 * `shutdown` flips a watch channel; every loop exits at its next suspension
 * point (stagger, tick in flight, or interval sleep) and is then joined. An
 * abandoned tick never publishes, entries already in the store stay readable.
 */

use crate::error::SourceError;
use crate::state::{shared, Shared};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Poll cadence of one collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    /// Delay before the first tick so collectors sharing a resource (docker
    /// socket, modem) do not all start at once.
    pub stagger: Duration,
}

impl Schedule {
    pub fn new(interval: Duration, stagger: Duration) -> Self {
        Self { interval, stagger }
    }

    /// `interval × factor`, the TTL unit every collector derives from.
    /// Saturates at `Duration::MAX`.
    pub fn ttl(&self, factor: f64) -> Duration {
        Duration::try_from_secs_f64(self.interval.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

/// An independently scheduled unit that acquires data from one source and
/// publishes zero or more entries.
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn schedule(&self) -> Schedule;

    /// One acquisition. `Err` means nothing was published this tick.
    async fn tick(&self, store: &Store) -> Result<(), SourceError>;
}

/// Per-collector run counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectorStatus {
    pub runs: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
}

/// Shared view of every collector's [`CollectorStatus`].
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Shared<BTreeMap<&'static str, CollectorStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            inner: shared(BTreeMap::new()),
        }
    }

    fn register(&self, name: &'static str) {
        self.inner.lock().entry(name).or_default();
    }

    fn record(&self, name: &'static str, outcome: &Result<(), SourceError>) {
        let now = Utc::now();
        let mut board = self.inner.lock();
        let status = board.entry(name).or_default();
        status.runs += 1;
        status.last_run = Some(now);
        match outcome {
            Ok(()) => {
                status.last_success = Some(now);
                status.last_error = None;
            }
            Err(err) => {
                status.failures += 1;
                status.last_error = Some(err.to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<CollectorStatus> {
        self.inner.lock().get(name).cloned()
    }

    pub fn all(&self) -> BTreeMap<&'static str, CollectorStatus> {
        self.inner.lock().clone()
    }
}

/// Owns the collector tasks and their shutdown signal.
pub struct Scheduler {
    store: Store,
    board: StatusBoard,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(store: Store) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            board: StatusBoard::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Builds a scheduler and spawns every collector.
    pub fn start(store: Store, collectors: Vec<Arc<dyn Collector>>) -> Self {
        let mut scheduler = Self::new(store);
        for collector in collectors {
            scheduler.spawn(collector);
        }
        scheduler
    }

    pub fn spawn(&mut self, collector: Arc<dyn Collector>) {
        let name = collector.name();
        self.board.register(name);
        let store = self.store.clone();
        let board = self.board.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_collector(collector, store, board, shutdown));
        self.handles.push((name, handle));
    }

    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn collector_names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    /// Signals every loop and waits until all of them have exited.
    pub async fn shutdown(self) {
        info!("Stopping {} collectors", self.handles.len());
        let _ = self.shutdown_tx.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!(collector = name, error = %e, "Collector task ended abnormally");
            }
        }
        info!("All collectors stopped");
    }
}

async fn run_collector(
    collector: Arc<dyn Collector>,
    store: Store,
    board: StatusBoard,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = collector.name();
    let schedule = collector.schedule();
    info!(collector = name, interval_ms = schedule.interval.as_millis() as u64, "Collector started");

    if !wait_or_stop(schedule.stagger, &mut shutdown).await {
        info!(collector = name, "Collector stopped before first tick");
        return;
    }

    loop {
        if *shutdown.borrow() {
            break;
        }

        // own task per tick so a panicking source only costs this tick
        let mut tick = {
            let collector = collector.clone();
            let store = store.clone();
            tokio::spawn(async move { collector.tick(&store).await })
        };
        let outcome = tokio::select! {
            joined = &mut tick => joined.unwrap_or_else(|e| Err(SourceError::Io(format!("tick aborted: {e}")))),
            _ = stopped(&mut shutdown) => {
                debug!(collector = name, "Abandoning in-flight tick");
                tick.abort();
                let _ = tick.await;
                break;
            }
        };

        if let Err(err) = &outcome {
            warn!(collector = name, error = %err, "Collector tick failed");
        }
        board.record(name, &outcome);

        if !wait_or_stop(schedule.interval, &mut shutdown).await {
            break;
        }
    }

    info!(collector = name, "Collector stopped");
}

/// Sleeps for `delay`; `false` when shutdown was requested first.
async fn wait_or_stop(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = stopped(shutdown) => false,
    }
}

/// Resolves once the shutdown flag is set or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counter {
        name: &'static str,
        key: &'static str,
        schedule: Schedule,
        ticks: AtomicU64,
        fail: bool,
        slow: Option<Duration>,
        panic_on_first: bool,
    }

    impl Counter {
        fn new(name: &'static str, key: &'static str, interval_ms: u64) -> Self {
            Self {
                name,
                key,
                schedule: Schedule::new(Duration::from_millis(interval_ms), Duration::from_millis(100)),
                ticks: AtomicU64::new(0),
                fail: false,
                slow: None,
                panic_on_first: false,
            }
        }
    }

    #[async_trait]
    impl Collector for Counter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn schedule(&self) -> Schedule {
            self.schedule
        }

        async fn tick(&self, store: &Store) -> Result<(), SourceError> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on_first && n == 1 {
                panic!("{} blew up", self.name);
            }
            if let Some(delay) = self.slow {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SourceError::Unavailable(format!("{} is down", self.name)));
            }
            store.publish(self.key, json!({ "tick": n }), self.schedule.ttl(1.5), None);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_collector_does_not_stop_others() {
        let store = Store::new();
        let good = Arc::new(Counter::new("good", "good", 1000));
        let mut bad = Counter::new("bad", "bad", 1000);
        bad.fail = true;
        let bad = Arc::new(bad);

        let collectors: Vec<Arc<dyn Collector>> = vec![good.clone(), bad.clone()];
        let scheduler = Scheduler::start(store.clone(), collectors);
        tokio::time::sleep(Duration::from_millis(5050)).await;

        assert!(good.ticks.load(Ordering::SeqCst) >= 5);
        assert!(bad.ticks.load(Ordering::SeqCst) >= 5);
        assert!(store.data("good").is_some());
        assert!(store.data("bad").is_none());

        let board = scheduler.status_board();
        let bad_status = board.get("bad").unwrap();
        assert_eq!(bad_status.failures, bad_status.runs);
        assert_eq!(bad_status.last_error.as_deref(), Some("bad is down"));
        assert_eq!(board.get("good").unwrap().failures, 0);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_tick_is_recorded_and_loop_continues() {
        let store = Store::new();
        let mut flaky = Counter::new("flaky", "flaky", 1000);
        flaky.panic_on_first = true;
        let flaky = Arc::new(flaky);

        let scheduler = Scheduler::start(store.clone(), vec![flaky.clone() as Arc<dyn Collector>]);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let status = scheduler.status_board().get("flaky").unwrap();
        assert_eq!(status.runs, 2);
        assert_eq!(status.failures, 1);
        assert!(status.last_error.is_none());
        assert_eq!(store.data("flaky"), Some(json!({ "tick": 2 })));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_collector_does_not_delay_fast_one() {
        let store = Store::new();
        let fast = Arc::new(Counter::new("fast", "fast", 200));
        let mut slow = Counter::new("slow", "slow", 200);
        slow.slow = Some(Duration::from_secs(60));
        let slow = Arc::new(slow);

        let collectors: Vec<Arc<dyn Collector>> = vec![fast.clone(), slow.clone()];
        let scheduler = Scheduler::start(store.clone(), collectors);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(fast.ticks.load(Ordering::SeqCst) >= 45);
        assert_eq!(slow.ticks.load(Ordering::SeqCst), 1);
        assert!(store.data("slow").is_none());

        // shutdown abandons the slow tick mid-acquisition and still returns
        scheduler.shutdown().await;
        assert!(store.data("slow").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_sleep_keeps_last_entries() {
        let store = Store::new();
        let collector = Arc::new(Counter::new("cpu", "cpu", 2000));
        let scheduler = Scheduler::start(store.clone(), vec![collector.clone() as Arc<dyn Collector>]);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let ticks = collector.ticks.load(Ordering::SeqCst);
        assert_eq!(ticks, 2);

        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(collector.ticks.load(Ordering::SeqCst), ticks);

        let snap = store.snapshot("cpu");
        assert_eq!(snap.data, Some(json!({ "tick": 2 })));
        assert!(snap.meta.stale);
        assert!(snap.meta.expired);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_stagger_elapses() {
        let store = Store::new();
        let collector = Arc::new(Counter::new("late", "late", 1000));
        let scheduler = Scheduler::start(store.clone(), vec![collector.clone() as Arc<dyn Collector>]);
        scheduler.shutdown().await;
        assert_eq!(collector.ticks.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn ttl_is_interval_multiple() {
        let schedule = Schedule::new(Duration::from_secs(2), Duration::ZERO);
        assert_eq!(schedule.ttl(1.5), Duration::from_secs(3));
    }

    #[test]
    fn ttl_saturates_instead_of_panicking() {
        let schedule = Schedule::new(Duration::MAX, Duration::ZERO);
        assert_eq!(schedule.ttl(8.0), Duration::MAX);
    }
}
