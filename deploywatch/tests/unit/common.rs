//! Scripted channels and fetchers shared by the controller tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use deploywatch::channel::{ChannelConnector, EventChannel};
use deploywatch::errors::ObserverError;
use deploywatch::models::frame::RawFrame;
use deploywatch::models::snapshot::LogSnapshot;
use deploywatch::models::status::DeploymentStatus;
use deploywatch::models::task::TaskHandle;
use deploywatch::observe::session::{ObservationMode, SessionId, SessionUpdate};
use deploywatch::observe::view::{DeploymentView, ViewState};
use deploywatch::workers::poller::LogFetcher;

// ================================ CHANNELS ================================= //

/// Counts what happened to the scripted channels of one connector
#[derive(Debug, Clone, Default)]
pub struct Probe {
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl Probe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

type FrameResult = Result<RawFrame, ObserverError>;

/// Test side of a scripted channel. Dropping it closes the channel from the
/// remote end.
pub struct FrameFeed(mpsc::UnboundedSender<FrameResult>);

impl FrameFeed {
    pub fn text(&self, text: &str) {
        let _ = self.0.send(Ok(RawFrame::Text(text.to_string())));
    }

    pub fn binary(&self, bytes: &[u8]) {
        let _ = self.0.send(Ok(RawFrame::Binary(bytes.to_vec())));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .0
            .send(Err(ObserverError::TransportError(message.to_string())));
    }
}

pub struct ScriptedChannel {
    frames: mpsc::UnboundedReceiver<FrameResult>,
    probe: Probe,
}

#[async_trait]
impl EventChannel for ScriptedChannel {
    async fn next_frame(&mut self) -> Option<FrameResult> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.frames.close();
    }
}

impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        self.probe.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out scripted channels in the order they were prepared
#[derive(Default)]
pub struct ScriptedConnector {
    pending: Mutex<VecDeque<ScriptedChannel>>,
    not_found: bool,
    pub probe: Probe,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect attempt answers 404
    pub fn not_found() -> Self {
        Self {
            not_found: true,
            ..Default::default()
        }
    }

    /// Prepare the channel returned by the next connect
    pub fn feed(&self) -> FrameFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.lock().unwrap().push_back(ScriptedChannel {
            frames: rx,
            probe: self.probe.clone(),
        });
        FrameFeed(tx)
    }
}

#[async_trait]
impl ChannelConnector for ScriptedConnector {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn EventChannel>, ObserverError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if self.not_found {
            return Err(ObserverError::NotFound(format!("task {}", task_id)));
        }
        match self.pending.lock().unwrap().pop_front() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(ObserverError::TransportError("connection refused".to_string())),
        }
    }
}

// ================================ FETCHERS ================================= //

#[derive(Debug, Clone)]
pub enum Reply {
    Lines(Vec<&'static str>),
    Report(Vec<&'static str>, &'static str),
    NotFound,
    Unreachable,
}

/// Answers fetches from a script; the last reply repeats once the script
/// runs out
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<(Duration, Reply)>>,
    last: Mutex<Option<(Duration, Reply)>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, reply: Reply) -> Self {
        self.then_after(Duration::ZERO, reply)
    }

    pub fn then_after(self, delay: Duration, reply: Reply) -> Self {
        self.script.lock().unwrap().push_back((delay, reply));
        self
    }

    /// Fetches started
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fetches that ran to completion
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogFetcher for ScriptedFetcher {
    async fn fetch(&self, task_id: &str) -> Result<LogSnapshot, ObserverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            let step = script.pop_front().or_else(|| last.clone());
            *last = step.clone();
            step
        };
        let (delay, reply) = step.unwrap_or((Duration::ZERO, Reply::Unreachable));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply {
            Reply::Lines(lines) => Ok(LogSnapshot::lines_only(owned(lines))),
            Reply::Report(lines, status) => Ok(LogSnapshot {
                logs: owned(lines),
                status: DeploymentStatus::from_wire(status),
            }),
            Reply::NotFound => Err(ObserverError::NotFound(format!("task {}", task_id))),
            Reply::Unreachable => Err(ObserverError::TransportError("connection reset".to_string())),
        }
    }
}

fn owned(lines: Vec<&str>) -> Vec<String> {
    lines.into_iter().map(String::from).collect()
}

// ================================ UPDATES ================================== //

/// Records every update a controller emits
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    updates: Arc<Mutex<Vec<SessionUpdate>>>,
}

impl Recorder {
    pub fn callback(&self) -> impl Fn(&SessionUpdate) + Send + Sync + 'static {
        let updates = self.updates.clone();
        move |update: &SessionUpdate| updates.lock().unwrap().push(update.clone())
    }

    pub fn all(&self) -> Vec<SessionUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn of(&self, session_id: SessionId) -> Vec<SessionUpdate> {
        self.all()
            .into_iter()
            .filter(|u| u.session_id == session_id)
            .collect()
    }

    pub fn last(&self) -> Option<SessionUpdate> {
        self.updates.lock().unwrap().last().cloned()
    }

    /// Replay everything recorded into a view bound to `session_id`
    pub fn view(
        &self,
        task: TaskHandle,
        owner_id: Option<&str>,
        session_id: SessionId,
        mode: ObservationMode,
    ) -> ViewState {
        let mut view = DeploymentView::new(task, owner_id.map(String::from), Default::default());
        view.bind(session_id, mode);
        for update in self.all() {
            view.apply(&update);
        }
        view.state().clone()
    }
}

/// Wait until `condition` holds, letting spawned tasks run in between
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..2500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

/// Give spawned tasks a few chances to run
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
