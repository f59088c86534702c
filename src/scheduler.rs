//! Timer-driven tasks: debounce, throttle and the periodic data feed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Local;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::generator::{time_label, DataFeed};
use crate::store::DashboardStore;

pub type SharedStore = Arc<Mutex<DashboardStore>>;
pub type SharedFeed = Arc<Mutex<DataFeed<StdRng>>>;

/// Message shown while the data source is failing
pub const FEED_ERROR_MESSAGE: &str = "Failed to update data";

/// Lock a shared value, recovering the guard if a previous holder panicked
pub fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

type Action<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Runs an action once input has been quiet for `delay`.
///
/// Each call cancels the pending run and schedules a new one with the latest
/// value, so a burst collapses into a single run.
pub struct Debouncer<T> {
    delay: Duration,
    action: Action<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration, action: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    pub fn call(&self, value: T) {
        let action = Arc::clone(&self.action);
        let delay = self.delay;

        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action(value);
        }));
    }

    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

struct ThrottleState {
    last_run: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
    /// Bumped on every call; a trailing run only fires if it is still current
    generation: u64,
}

/// Runs an action at most once per `window`.
///
/// A call outside the window runs immediately. Calls inside it are folded
/// into one trailing run at the end of the window carrying the latest value.
pub struct Throttle<T> {
    window: Duration,
    action: Action<T>,
    state: Arc<Mutex<ThrottleState>>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new(window: Duration, action: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            window,
            action: Arc::new(action),
            state: Arc::new(Mutex::new(ThrottleState {
                last_run: None,
                trailing: None,
                generation: 0,
            })),
        }
    }

    pub fn call(&self, value: T) {
        let now = Instant::now();
        let mut state = lock(&self.state);
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        // Abort is best effort: a trailing task already past its sleep
        // notices the newer generation instead
        if let Some(trailing) = state.trailing.take() {
            trailing.abort();
        }

        let next_allowed = state.last_run.map(|last| last + self.window);
        match next_allowed {
            Some(at) if at > now => {
                let action = Arc::clone(&self.action);
                let shared = Arc::clone(&self.state);
                state.trailing = Some(tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    {
                        let mut state = lock(&shared);
                        if state.generation != generation {
                            return;
                        }
                        state.last_run = Some(Instant::now());
                        state.trailing = None;
                    }
                    action(value);
                }));
            }
            _ => {
                state.last_run = Some(now);
                drop(state);
                (self.action)(value);
            }
        }
    }
}

/// Poll the feed once and apply the outcome to the store
pub fn tick_once(store: &SharedStore, feed: &SharedFeed) {
    let time = time_label(Local::now());
    let outcome = lock(feed).next_record(&time);

    let mut store = lock(store);
    match outcome {
        Ok(delivery) => {
            if delivery.failed_attempts > 0 {
                debug!(failed_attempts = delivery.failed_attempts, "feed recovered after retries");
            }
            store.add_record(delivery.record);
            store.record_feed_success();
        }
        Err(e) => {
            warn!(error = %e, "data feed tick failed");
            store.record_feed_failure(FEED_ERROR_MESSAGE);
        }
    }
}

/// Cancel handle for the periodic feed task
pub struct FeedHandle {
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Appends one feed record to `store` every `interval`, starting one interval from now
pub fn spawn_feed(store: SharedStore, feed: SharedFeed, interval: Duration) -> FeedHandle {
    info!(interval_ms = interval.as_millis() as u64, "starting data feed");
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tick_once(&store, &feed);
        }
    });
    FeedHandle { task }
}
