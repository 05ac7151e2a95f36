//! Observation session: one task, one acquisition mode, one buffer

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::models::frame::Frame;
use crate::models::log_line::LogLine;
use crate::models::snapshot::LogSnapshot;
use crate::models::status::DeploymentStatus;
use crate::models::task::TaskHandle;
use crate::observe::buffer::LogBuffer;
use crate::observe::fsm::{StatusMachine, Transition};
use crate::observe::inference::{Inference, StatusInference};

/// Identity of one observation session. A fresh id is minted on every start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How log data is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationMode {
    #[default]
    Stream,
    Poll,
}

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Errored,
    Closed,
}

/// Discrete notifications for UI collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ConnectionLost,
    TerminalReached(DeploymentStatus),
    TaskNotFound,
}

/// Delta published after a session changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    pub session_id: SessionId,
    pub mode: ObservationMode,

    /// Lines added since the previous update
    pub lines: Vec<LogLine>,

    /// How many previously published lines are still valid. Mirrors truncate
    /// to this length before extending with `lines`.
    pub retained: usize,

    pub status: DeploymentStatus,
    pub connection: ConnectionState,
    pub error: Option<ErrorKind>,
    pub notice: Option<Notice>,
}

/// Callback invoked with every session update
pub type UpdateCallback = Arc<dyn Fn(&SessionUpdate) + Send + Sync>;

/// Registered update callbacks, shared between a controller and its tasks
#[derive(Clone, Default)]
pub struct UpdateListeners {
    callbacks: Arc<Mutex<Vec<UpdateCallback>>>,
    emitting: Arc<Mutex<()>>,
}

impl UpdateListeners {
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&SessionUpdate) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.push(Arc::new(callback));
    }

    /// Run `f` and emit the updates it returns.
    ///
    /// Publications are serialized, so updates reach the callbacks in the
    /// order `f` produced them. `f` must release any state lock it takes
    /// before returning: callbacks are free to read that state again.
    pub fn publish<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> (R, Vec<SessionUpdate>),
    {
        let _emitting = self.emitting.lock().unwrap_or_else(|e| e.into_inner());
        let (result, updates) = f();
        for update in &updates {
            self.emit(update);
        }
        result
    }

    fn emit(&self, update: &SessionUpdate) {
        let callbacks: Vec<UpdateCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(update);
        }
    }
}

impl fmt::Debug for UpdateListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.callbacks.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("UpdateListeners").field("count", &count).finish()
    }
}

/// State owned by one observation session
#[derive(Debug)]
pub struct ObservationSession {
    id: SessionId,
    mode: ObservationMode,
    task: TaskHandle,
    buffer: LogBuffer,
    machine: StatusMachine,
    connection: ConnectionState,
    error: Option<ErrorKind>,
    inference: StatusInference,
}

impl ObservationSession {
    pub fn new(mode: ObservationMode, task: TaskHandle, inference: StatusInference) -> Self {
        Self {
            id: SessionId::new(),
            mode,
            task,
            buffer: LogBuffer::new(),
            machine: StatusMachine::new(),
            connection: ConnectionState::Connecting,
            error: None,
            inference,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> ObservationMode {
        self.mode
    }

    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    pub fn status(&self) -> DeploymentStatus {
        self.machine.status()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.is_terminal()
    }

    /// Whether the session has ended. A poll error is transient (the next
    /// fetch may succeed); a stream error is not.
    pub fn is_finished(&self) -> bool {
        match self.connection {
            ConnectionState::Closed => true,
            ConnectionState::Errored => self.mode == ObservationMode::Stream,
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.buffer.snapshot()
    }

    /// Update describing the whole current state, used right after start
    pub fn full_update(&self) -> SessionUpdate {
        self.update(self.buffer.snapshot(), 0, None)
    }

    fn update(&self, lines: Vec<LogLine>, retained: usize, notice: Option<Notice>) -> SessionUpdate {
        SessionUpdate {
            session_id: self.id,
            mode: self.mode,
            lines,
            retained,
            status: self.machine.status(),
            connection: self.connection,
            error: self.error,
            notice,
        }
    }

    fn unchanged(&self) -> SessionUpdate {
        self.update(Vec::new(), self.buffer.len(), None)
    }

    /// Channel or first fetch succeeded
    pub fn mark_open(&mut self) -> Option<SessionUpdate> {
        if self.connection == ConnectionState::Open && self.error.is_none() {
            return None;
        }
        self.connection = ConnectionState::Open;
        self.error = None;
        Some(self.unchanged())
    }

    /// Session-ending failure
    pub fn fail(&mut self, kind: ErrorKind) -> SessionUpdate {
        self.connection = ConnectionState::Errored;
        self.error = Some(kind);
        let notice = match kind {
            ErrorKind::TransportError => Some(Notice::ConnectionLost),
            ErrorKind::TaskNotFound => Some(Notice::TaskNotFound),
            _ => None,
        };
        self.update(Vec::new(), self.buffer.len(), notice)
    }

    /// Release the session. Returns `None` if it already ended.
    pub fn close(&mut self) -> Option<SessionUpdate> {
        if self.is_finished() {
            return None;
        }
        self.connection = ConnectionState::Closed;
        Some(self.unchanged())
    }

    /// Feed a status through the monotonic machine
    fn feed_status(&mut self, inference: Inference) -> Option<Notice> {
        let status = inference.status?;
        match self.machine.advance(status) {
            Ok(Transition::Advanced { from, to }) => {
                info!(session = %self.id, "Deployment status {} -> {}", from, to);
                to.is_terminal().then_some(Notice::TerminalReached(to))
            }
            Ok(Transition::Unchanged) => None,
            Err(e) => {
                warn!(session = %self.id, "Ignoring status update: {}", e);
                None
            }
        }
    }

    /// Apply one decoded stream frame.
    ///
    /// Structured frames replace the buffer, plain-text frames append. Once
    /// the status is terminal no frame is consulted any more.
    pub fn apply_frame(&mut self, frame: &Frame) -> Option<SessionUpdate> {
        if self.machine.is_terminal() || self.is_finished() {
            debug!(session = %self.id, "Session already ended, dropping frame");
            return None;
        }

        let previous_len = self.buffer.len();
        let previous_status = self.machine.status();
        let (lines, retained) = match frame {
            Frame::Structured { logs: Some(logs), .. } => {
                let replacement = self.buffer.replace_all(logs.iter().cloned());
                (replacement.appended, replacement.retained)
            }
            Frame::Structured { logs: None, .. } => (Vec::new(), previous_len),
            Frame::PlainText { text } => {
                let lines = self.buffer.append(text.as_str()).into_iter().collect();
                (lines, previous_len)
            }
        };

        let inference = self.inference.classify(frame);
        let notice = self.feed_status(inference);

        let changed = !lines.is_empty()
            || retained != previous_len
            || self.machine.status() != previous_status;
        changed.then(|| self.update(lines, retained, notice))
    }

    /// Reconcile a full snapshot fetched by a poll
    pub fn apply_snapshot(&mut self, snapshot: &LogSnapshot) -> Option<SessionUpdate> {
        let previous_len = self.buffer.len();
        let previous_status = self.machine.status();
        let previous_connection = (self.connection, self.error);

        let replacement = self.buffer.replace_all(snapshot.logs.iter().cloned());

        let notice = if self.machine.is_terminal() {
            None
        } else {
            let inference = match snapshot.status {
                Some(status) => Inference {
                    status: Some(status),
                    is_terminal: status.is_terminal(),
                },
                None => self.inference.classify_lines(&snapshot.logs),
            };
            self.feed_status(inference)
        };

        self.connection = ConnectionState::Open;
        self.error = None;

        let changed = !replacement.is_noop(previous_len)
            || self.machine.status() != previous_status
            || (self.connection, self.error) != previous_connection;
        changed.then(|| self.update(replacement.appended, replacement.retained, notice))
    }

    /// A poll failed; the session stays alive for the next attempt
    pub fn note_fetch_error(&mut self, kind: ErrorKind) -> Option<SessionUpdate> {
        if self.connection == ConnectionState::Errored && self.error == Some(kind) {
            return None;
        }
        Some(self.fail(kind))
    }
}
