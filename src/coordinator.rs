use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::client::AkariClient;
use crate::diff::changed_paths;
use crate::types::Snapshot;
use crate::{Error, Result};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Token returned by [`Coordinator::subscribe`]; hand it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Where the coordinator is in its refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshState {
    Idle,
    InFlight,
    Succeeded {
        snapshot: Arc<Snapshot>,
        at: DateTime<Utc>,
    },
    Failed {
        error: Error,
        at: DateTime<Utc>,
        last_good: Option<Arc<Snapshot>>,
    },
}

/// Single shared poller for one device.
///
/// Fetches status and system info together, publishes the merged
/// [`Snapshot`] and invalidates every subscribed view. Cheap to clone.
///
/// At most one refresh cycle runs at a time. A refresh requested while a
/// cycle is in flight waits for that cycle and returns its outcome instead of
/// issuing new requests.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    client: AkariClient,
    interval: Duration,
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    state: watch::Sender<RefreshState>,
    cycle_lock: tokio::sync::Mutex<()>,
    completed_cycles: AtomicU64,
    last_outcome: Mutex<Option<Result<()>>>,
    observers: Mutex<HashMap<SubscriptionId, Observer>>,
    next_subscription: AtomicU64,
    reschedule: Arc<Notify>,
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(client: AkariClient, name: impl Into<String>, interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(None);
        let (state, _) = watch::channel(RefreshState::Idle);

        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                client,
                interval,
                snapshot,
                state,
                cycle_lock: tokio::sync::Mutex::new(()),
                completed_cycles: AtomicU64::new(0),
                last_outcome: Mutex::new(None),
                observers: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                reschedule: Arc::new(Notify::new()),
                cancel: CancellationToken::new(),
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn client(&self) -> &AkariClient {
        &self.inner.client
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    // -- Refresh triggers --

    /// Mandatory initial cycle run during setup.
    ///
    /// The error is returned untouched so setup can tell an auth failure
    /// (abort) from an unreachable device (try again later).
    pub async fn first_refresh(&self) -> Result<()> {
        self.run_cycle("first").await
    }

    /// One timer-driven cycle. Failures are recorded in [`RefreshState`].
    pub async fn scheduled_refresh(&self) -> Result<()> {
        self.run_cycle("scheduled").await
    }

    /// Out-of-band cycle, typically after a write action. The next timer tick
    /// is re-armed to a full interval from now.
    pub async fn request_refresh(&self) -> Result<()> {
        let outcome = self.run_cycle("requested").await;
        self.inner.reschedule.notify_one();
        outcome
    }

    // -- Lifecycle --

    /// Spawn the polling timer. Calling it again is a no-op.
    ///
    /// The timer only holds a weak handle: once every `Coordinator` clone is
    /// dropped it stops, even without [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let mut timer = self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return;
        }
        debug!(
            device = %self.inner.name,
            interval = ?self.inner.interval,
            "starting refresh timer"
        );
        *timer = Some(tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            self.inner.name.clone(),
            self.inner.interval,
            Arc::clone(&self.inner.reschedule),
            self.inner.cancel.clone(),
        )));
    }

    /// Cancel the timer and discard the result of any in-flight cycle.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!(device = %self.inner.name, "coordinator shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // -- Observers --

    /// Register an invalidation callback, run after every completed cycle.
    pub fn subscribe(&self, observer: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers().insert(id, Arc::new(observer));
        trace!(device = %self.inner.name, ?id, "observer subscribed");
        id
    }

    /// Remove exactly the callback `subscribe` returned `id` for.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.observers().remove(&id).is_some();
        trace!(device = %self.inner.name, ?id, removed, "observer unsubscribed");
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers().len()
    }

    // -- Readers --

    /// Last successfully fetched snapshot, kept across failed cycles.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.snapshot.subscribe()
    }

    pub fn state(&self) -> RefreshState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<RefreshState> {
        self.inner.state.subscribe()
    }

    /// Whether the most recent completed cycle succeeded.
    pub fn last_update_success(&self) -> bool {
        matches!(*self.last_outcome(), Some(Ok(())))
    }

    pub fn last_error(&self) -> Option<Error> {
        match &*self.last_outcome() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    // -- Internals --

    async fn run_cycle(&self, trigger: &'static str) -> Result<()> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let seen = inner.completed_cycles.load(Ordering::Acquire);
        let guard = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return Err(Error::Cancelled),
            guard = inner.cycle_lock.lock() => guard,
        };
        if inner.completed_cycles.load(Ordering::Acquire) != seen {
            trace!(device = %inner.name, trigger, "joined in-flight refresh");
            return self.last_outcome().clone().unwrap_or(Err(Error::Cancelled));
        }

        trace!(device = %inner.name, trigger, "refresh cycle started");
        inner.state.send_replace(RefreshState::InFlight);

        let fetched = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => {
                debug!(device = %inner.name, trigger, "refresh result discarded after shutdown");
                return Err(Error::Cancelled);
            }
            res = self.fetch() => res,
        };

        let outcome = self.publish(fetched);
        *self.last_outcome() = Some(outcome.clone());
        inner.completed_cycles.fetch_add(1, Ordering::Release);
        drop(guard);

        self.notify_observers();
        outcome
    }

    async fn fetch(&self) -> Result<(Value, Value)> {
        let client = &self.inner.client;
        tokio::try_join!(client.get_status(), client.get_system_info())
    }

    fn publish(&self, fetched: Result<(Value, Value)>) -> Result<()> {
        let inner = &self.inner;
        let at = Utc::now();
        match fetched {
            Ok((status, system_info)) => {
                let snapshot = Arc::new(Snapshot::at(status, system_info, at));
                match self.snapshot() {
                    Some(prev) => {
                        let changed = changed_paths(prev.as_value(), snapshot.as_value());
                        debug!(device = %inner.name, changed = changed.len(), "snapshot updated");
                    }
                    None => debug!(device = %inner.name, "first snapshot published"),
                }
                inner.snapshot.send_replace(Some(Arc::clone(&snapshot)));
                inner.state.send_replace(RefreshState::Succeeded { snapshot, at });
                Ok(())
            }
            Err(error) => {
                warn!(device = %inner.name, error = %error, "error fetching Akari data");
                inner.state.send_replace(RefreshState::Failed {
                    error: error.clone(),
                    at,
                    last_good: self.snapshot(),
                });
                Err(error)
            }
        }
    }

    fn notify_observers(&self) {
        let observers: Vec<Observer> = self.observers().values().cloned().collect();
        for observer in observers {
            observer();
        }
    }

    fn observers(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Observer>> {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn last_outcome(&self) -> std::sync::MutexGuard<'_, Option<Result<()>>> {
        self.inner
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_timer(
    inner: Weak<Inner>,
    name: String,
    interval: Duration,
    reschedule: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = reschedule.notified() => {
                trace!(device = %name, "timer re-armed");
            }
            () = tokio::time::sleep(interval) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let coordinator = Coordinator { inner };
                if let Err(e) = coordinator.scheduled_refresh().await {
                    debug!(device = %name, error = %e, "scheduled refresh did not succeed");
                }
            }
        }
    }
    trace!(device = %name, "refresh timer stopped");
}
