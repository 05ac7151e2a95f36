//! Poll session controller
//!
//! Fetches full log snapshots on demand or on a timer and reconciles each one
//! against the session buffer.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::{ErrorKind, ObserverError};
use crate::models::log_line::LogLine;
use crate::models::snapshot::LogSnapshot;
use crate::models::status::DeploymentStatus;
use crate::models::task::TaskHandle;
use crate::observe::inference::StatusInference;
use crate::observe::session::{
    ConnectionState, ObservationMode, ObservationSession, SessionId, SessionUpdate,
    UpdateListeners,
};

/// Source of full log snapshots for a task
#[async_trait]
pub trait LogFetcher: Send + Sync + 'static {
    async fn fetch(&self, task_id: &str) -> Result<LogSnapshot, ObserverError>;
}

/// Poll controller options
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Refresh interval while auto-refresh is on
    pub interval: Duration,

    /// Repeat fetches on a timer
    pub auto_refresh: bool,

    /// Stop the timer once the deployment finished
    pub stop_on_terminal: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            auto_refresh: false,
            stop_on_terminal: true,
        }
    }
}

/// Shortest refresh period the timer accepts
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

fn refresh_period(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        warn!("Refresh interval {:?} is too short, using {:?}", interval, MIN_INTERVAL);
        return MIN_INTERVAL;
    }
    interval
}

/// Background refresher task, aborted when dropped
struct RefreshTimer(JoinHandle<()>);

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct PollState {
    session: ObservationSession,
    timer: Option<RefreshTimer>,
    auto_refresh: bool,
    interval: Duration,
    next_ticket: u64,
    applied_ticket: u64,
}

struct Shared {
    state: Mutex<Option<PollState>>,
    listeners: UpdateListeners,
    stop_on_terminal: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<PollState>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_ticket(&self, id: SessionId) -> Option<u64> {
        let mut guard = self.lock();
        let state = guard.as_mut().filter(|s| s.session.id() == id)?;
        if state.session.is_finished() || !state.session.task().is_addressable() {
            return None;
        }
        state.next_ticket += 1;
        Some(state.next_ticket)
    }

    /// Apply a fetch result. Returns whether the session is still worth
    /// polling.
    fn settle(
        &self,
        id: SessionId,
        ticket: u64,
        result: Result<LogSnapshot, ObserverError>,
    ) -> bool {
        self.listeners.publish(|| {
            let mut guard = self.lock();
            let Some(state) = guard.as_mut().filter(|s| s.session.id() == id) else {
                debug!(session = %id, "Dropping fetch result of a stopped session");
                return (false, Vec::new());
            };
            if state.session.is_finished() {
                return (false, Vec::new());
            }
            if ticket <= state.applied_ticket {
                debug!(session = %id, ticket, "Dropping superseded fetch result");
                return (true, Vec::new());
            }
            state.applied_ticket = ticket;

            let mut updates: Vec<SessionUpdate> = match result {
                Ok(snapshot) => state.session.apply_snapshot(&snapshot),
                Err(e) => {
                    let kind = e.kind();
                    if kind == ErrorKind::TaskNotFound {
                        warn!(session = %id, "Task not found: {}", e);
                    } else {
                        error!(session = %id, "Failed to fetch logs: {}", e);
                    }
                    state.session.note_fetch_error(kind)
                }
            }
            .into_iter()
            .collect();

            if self.stop_on_terminal && state.session.is_terminal() {
                info!(
                    session = %id,
                    "Deployment finished with {}, polling stopped",
                    state.session.status()
                );
                state.timer.take();
                updates.extend(state.session.close());
                return (false, updates);
            }
            (true, updates)
        })
    }
}

async fn refresh<F: LogFetcher>(shared: &Shared, fetcher: &F, id: SessionId, task_id: &str) -> bool {
    let Some(ticket) = shared.take_ticket(id) else {
        return false;
    };
    debug!(session = %id, ticket, "Fetching logs for task {}", task_id);
    let result = fetcher.fetch(task_id).await;
    shared.settle(id, ticket, result)
}

/// One fetch, or a fetch every `period` when given. A tick that fires while
/// the previous fetch is still running supersedes it.
async fn run_refresher<F: LogFetcher>(
    shared: Arc<Shared>,
    fetcher: Arc<F>,
    id: SessionId,
    task_id: String,
    period: Option<Duration>,
) {
    let Some(period) = period else {
        refresh(&shared, fetcher.as_ref(), id, &task_id).await;
        return;
    };

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: BoxFuture<'_, bool> = future::ready(true).boxed();
    let mut busy = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if busy {
                    debug!(session = %id, "Previous fetch still running, superseding it");
                }
                in_flight = refresh(&shared, fetcher.as_ref(), id, &task_id).boxed();
                busy = true;
            }
            live = &mut in_flight, if busy => {
                busy = false;
                if !live {
                    break;
                }
            }
        }
    }
    debug!(session = %id, "Refresh timer stopped");
}

fn spawn_refresher<F: LogFetcher>(
    shared: &Arc<Shared>,
    fetcher: &Arc<F>,
    session: &ObservationSession,
    period: Option<Duration>,
) -> RefreshTimer {
    RefreshTimer(tokio::spawn(run_refresher(
        shared.clone(),
        fetcher.clone(),
        session.id(),
        session.task().task_id().to_string(),
        period,
    )))
}

/// Observes a deployment by fetching full snapshots
pub struct PollController<F: LogFetcher> {
    fetcher: Arc<F>,
    inference: StatusInference,
    options: PollOptions,
    shared: Arc<Shared>,
}

impl<F: LogFetcher> PollController<F> {
    pub fn new(fetcher: Arc<F>, inference: StatusInference, options: PollOptions) -> Self {
        let stop_on_terminal = options.stop_on_terminal;
        Self {
            fetcher,
            inference,
            options,
            shared: Arc::new(Shared {
                state: Mutex::new(None),
                listeners: UpdateListeners::default(),
                stop_on_terminal,
            }),
        }
    }

    /// Register a callback for session updates
    pub fn on_update<C>(&self, callback: C)
    where
        C: Fn(&SessionUpdate) + Send + Sync + 'static,
    {
        self.shared.listeners.register(callback);
    }

    /// Start polling `task`, superseding any previous session. Fetches once
    /// right away, then every `interval` while auto-refresh is on.
    pub async fn start(&self, task: &TaskHandle, interval: Duration) -> SessionId {
        self.stop().await;

        let session =
            ObservationSession::new(ObservationMode::Poll, task.clone(), self.inference.clone());
        let id = session.id();
        let interval = refresh_period(interval);
        let mut state = PollState {
            session,
            timer: None,
            auto_refresh: self.options.auto_refresh,
            interval,
            next_ticket: 0,
            applied_ticket: 0,
        };

        self.shared.listeners.publish(|| {
            let mut updates = vec![state.session.full_update()];
            let mut guard = self.shared.lock();

            if !task.is_addressable() {
                warn!("Cannot poll logs: no task id");
                updates.push(state.session.fail(ErrorKind::MissingIdentifier));
            } else {
                info!(
                    session = %id,
                    auto_refresh = state.auto_refresh,
                    "Polling logs for task {} every {:?}",
                    task.task_id(),
                    interval
                );
                let period = state.auto_refresh.then_some(interval);
                state.timer = Some(spawn_refresher(&self.shared, &self.fetcher, &state.session, period));
            }

            *guard = Some(state);
            (id, updates)
        })
    }

    /// Stop the current session. Idempotent.
    pub async fn stop(&self) {
        let timer = self.shared.listeners.publish(|| {
            let mut guard = self.shared.lock();
            let Some(state) = guard.as_mut() else {
                return (None, Vec::new());
            };
            let update = state.session.close();
            if update.is_some() {
                info!(session = %state.session.id(), "Polling stopped");
            }
            (state.timer.take(), update.into_iter().collect())
        });
        drop(timer);
    }

    /// Fetch now, alongside any running timer
    pub async fn refresh_now(&self) {
        let current = {
            let guard = self.shared.lock();
            guard
                .as_ref()
                .map(|s| (s.session.id(), s.session.task().task_id().to_string()))
        };
        if let Some((id, task_id)) = current {
            refresh(&self.shared, self.fetcher.as_ref(), id, &task_id).await;
        }
    }

    /// Turn the refresh timer on or off for the current session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_auto_refresh(&self, enabled: bool) {
        let mut guard = self.shared.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };
        if state.auto_refresh == enabled {
            return;
        }
        state.auto_refresh = enabled;

        if state.session.is_finished() || !state.session.task().is_addressable() {
            return;
        }
        if enabled {
            info!(session = %state.session.id(), "Auto-refresh enabled");
            let period = Some(state.interval);
            state.timer = Some(spawn_refresher(&self.shared, &self.fetcher, &state.session, period));
        } else {
            info!(session = %state.session.id(), "Auto-refresh disabled");
            state.timer.take();
        }
    }

    pub fn auto_refresh(&self) -> bool {
        self.shared
            .lock()
            .as_ref()
            .map_or(self.options.auto_refresh, |s| s.auto_refresh)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.lock().as_ref().map(|s| s.session.id())
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.shared.lock().as_ref().map(|s| s.session.connection())
    }

    pub fn status(&self) -> DeploymentStatus {
        self.shared
            .lock()
            .as_ref()
            .map(|s| s.session.status())
            .unwrap_or_default()
    }

    /// Ordered copy of the current session's buffer
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.shared
            .lock()
            .as_ref()
            .map(|s| s.session.snapshot())
            .unwrap_or_default()
    }
}

impl<F: LogFetcher> Drop for PollController<F> {
    fn drop(&mut self) {
        if let Some(state) = self.shared.lock().as_mut() {
            state.timer.take();
        }
    }
}
