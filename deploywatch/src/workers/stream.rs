//! Stream session controller
//!
//! Holds one subscription to a task's event channel, decodes every frame in
//! arrival order and closes the channel as soon as the outcome is known.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelConnector, EventChannel};
use crate::errors::ErrorKind;
use crate::models::frame::Frame;
use crate::models::log_line::LogLine;
use crate::models::status::DeploymentStatus;
use crate::models::task::TaskHandle;
use crate::observe::inference::StatusInference;
use crate::observe::session::{
    ConnectionState, ObservationMode, ObservationSession, SessionId, SessionUpdate,
    UpdateListeners,
};

struct ActiveStream {
    session: ObservationSession,
    reader: Option<JoinHandle<()>>,
}

struct Shared {
    active: Mutex<Option<ActiveStream>>,
    listeners: UpdateListeners,
}

/// What the reader should do after touching the session
enum Step {
    Continue,
    Finished,
    Superseded,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` against the session if it is still the current one and
    /// publish its updates once the state lock is released.
    fn with_session<F>(&self, id: SessionId, f: F) -> Step
    where
        F: FnOnce(&mut ObservationSession) -> Vec<SessionUpdate>,
    {
        self.listeners.publish(|| {
            let mut active = self.lock();
            let Some(active) = active.as_mut().filter(|a| a.session.id() == id) else {
                return (Step::Superseded, Vec::new());
            };
            if active.session.is_finished() {
                return (Step::Superseded, Vec::new());
            }

            let updates = f(&mut active.session);
            let step = if active.session.is_finished() {
                Step::Finished
            } else {
                Step::Continue
            };
            (step, updates)
        })
    }
}

/// Observes a deployment through a push channel
pub struct StreamController<C: ChannelConnector> {
    connector: Arc<C>,
    inference: StatusInference,
    shared: Arc<Shared>,
}

impl<C: ChannelConnector> StreamController<C> {
    pub fn new(connector: Arc<C>, inference: StatusInference) -> Self {
        Self {
            connector,
            inference,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                listeners: UpdateListeners::default(),
            }),
        }
    }

    /// Register a callback for session updates
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&SessionUpdate) + Send + Sync + 'static,
    {
        self.shared.listeners.register(callback);
    }

    /// Start observing `task`, superseding any previous session.
    ///
    /// Never fails: a missing task id is reported as an errored session.
    pub async fn start(&self, task: &TaskHandle) -> SessionId {
        self.stop().await;

        let session = ObservationSession::new(
            ObservationMode::Stream,
            task.clone(),
            self.inference.clone(),
        );
        let id = session.id();
        let mut active = ActiveStream {
            session,
            reader: None,
        };

        self.shared.listeners.publish(|| {
            let mut updates = vec![active.session.full_update()];
            let mut guard = self.shared.lock();

            if !task.is_addressable() {
                warn!("Cannot open log stream: no task id");
                updates.push(active.session.fail(ErrorKind::MissingIdentifier));
            } else {
                info!(session = %id, "Opening log stream for task {}", task.task_id());
                active.reader = Some(tokio::spawn(read_frames(
                    self.shared.clone(),
                    self.connector.clone(),
                    id,
                    task.task_id().to_string(),
                )));
            }

            *guard = Some(active);
            (id, updates)
        })
    }

    /// Stop the current session. Idempotent.
    pub async fn stop(&self) {
        let reader = self.shared.listeners.publish(|| {
            let mut guard = self.shared.lock();
            let Some(active) = guard.as_mut() else {
                return (None, Vec::new());
            };
            let update = active.session.close();
            if update.is_some() {
                info!(session = %active.session.id(), "Log stream stopped");
            }
            (active.reader.take(), update.into_iter().collect())
        });

        if let Some(reader) = reader {
            reader.abort();
            // wait for the reader to drop its channel
            let _ = reader.await;
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.lock().as_ref().map(|a| a.session.id())
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.shared.lock().as_ref().map(|a| a.session.connection())
    }

    pub fn status(&self) -> DeploymentStatus {
        self.shared
            .lock()
            .as_ref()
            .map(|a| a.session.status())
            .unwrap_or_default()
    }

    /// Ordered copy of the current session's buffer
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.shared
            .lock()
            .as_ref()
            .map(|a| a.session.snapshot())
            .unwrap_or_default()
    }
}

impl<C: ChannelConnector> Drop for StreamController<C> {
    fn drop(&mut self) {
        if let Some(reader) = self.shared.lock().as_mut().and_then(|a| a.reader.take()) {
            reader.abort();
        }
    }
}

async fn read_frames<C: ChannelConnector>(
    shared: Arc<Shared>,
    connector: Arc<C>,
    id: SessionId,
    task_id: String,
) {
    let mut channel = match connector.connect(&task_id).await {
        Ok(channel) => channel,
        Err(e) => {
            error!(session = %id, "Failed to open log stream: {}", e);
            shared.with_session(id, |s| vec![s.fail(e.kind())]);
            return;
        }
    };

    if let Step::Continue = shared.with_session(id, |s| s.mark_open().into_iter().collect()) {
        pump(&shared, channel.as_mut(), id).await;
    }

    channel.close().await;
    debug!(session = %id, "Log stream released");
}

async fn pump(shared: &Shared, channel: &mut dyn EventChannel, id: SessionId) {
    loop {
        let step = match channel.next_frame().await {
            Some(Ok(raw)) => {
                let frame = match Frame::decode_raw(&raw) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(session = %id, "Dropping ambiguous frame: {}", e);
                        continue;
                    }
                };
                debug!(session = %id, "Frame: {:?}", frame);

                shared.with_session(id, |s| {
                    let mut updates: Vec<SessionUpdate> = s.apply_frame(&frame).into_iter().collect();
                    if s.is_terminal() {
                        updates.extend(s.close());
                    }
                    updates
                })
            }
            Some(Err(e)) => {
                error!(session = %id, "Log stream error: {}", e);
                shared.with_session(id, |s| vec![s.fail(ErrorKind::TransportError)])
            }
            None => {
                warn!(session = %id, "Log stream ended before the deployment finished");
                shared.with_session(id, |s| vec![s.fail(ErrorKind::TransportError)])
            }
        };

        match step {
            Step::Continue => {}
            Step::Finished | Step::Superseded => return,
        }
    }
}
