//! Render-ready deployment view state

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::errors::ErrorKind;
use crate::models::log_line::LogLine;
use crate::models::status::DeploymentStatus;
use crate::models::task::TaskHandle;
use crate::observe::session::{ConnectionState, ObservationMode, SessionId, SessionUpdate};

const DEFAULT_ARTIFACT_TEMPLATE: &str =
    "https://buildbox-frontend.s3.ap-south-1.amazonaws.com/{owner}/{project}/Frontend/index.html";

/// URL template of a deployed site, with `{owner}` and `{project}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLinkTemplate(String);

impl ArtifactLinkTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, owner_id: &str, project_ref: &str) -> String {
        self.0
            .replace("{owner}", owner_id)
            .replace("{project}", project_ref)
    }
}

impl Default for ArtifactLinkTemplate {
    fn default() -> Self {
        Self(DEFAULT_ARTIFACT_TEMPLATE.to_string())
    }
}

/// Snapshot a presentation layer binds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub session_id: Option<SessionId>,
    pub mode: ObservationMode,
    pub task_id: String,
    pub status: DeploymentStatus,
    pub lines: Vec<LogLine>,
    pub connection: ConnectionState,
    pub error: Option<ErrorKind>,

    /// Live site link, only once the deployment succeeded
    pub artifact_url: Option<String>,
}

impl ViewState {
    fn empty(task_id: &str) -> Self {
        Self {
            session_id: None,
            mode: ObservationMode::default(),
            task_id: task_id.to_string(),
            status: DeploymentStatus::Pending,
            lines: Vec::new(),
            connection: ConnectionState::Connecting,
            error: None,
            artifact_url: None,
        }
    }

    /// Error message to show, if any
    pub fn error_message(&self) -> Option<&'static str> {
        self.error
            .filter(ErrorKind::is_user_visible)
            .map(|kind| kind.user_message())
    }
}

/// Composes session updates with task metadata.
///
/// Holds no business logic: it mirrors the bound session and derives the
/// artifact link.
#[derive(Debug)]
pub struct DeploymentView {
    task: TaskHandle,
    owner_id: Option<String>,
    template: ArtifactLinkTemplate,
    state: ViewState,
    tx: watch::Sender<ViewState>,
}

impl DeploymentView {
    pub fn new(task: TaskHandle, owner_id: Option<String>, template: ArtifactLinkTemplate) -> Self {
        let state = ViewState::empty(task.task_id());
        let (tx, _rx) = watch::channel(state.clone());
        Self {
            task,
            owner_id,
            template,
            state,
            tx,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.tx.subscribe()
    }

    /// Make `session_id` the authoritative source and clear the previous
    /// session's contents
    pub fn bind(&mut self, session_id: SessionId, mode: ObservationMode) {
        self.state = ViewState::empty(self.task.task_id());
        self.state.session_id = Some(session_id);
        self.state.mode = mode;
        self.publish();
    }

    /// Apply an update. Updates from any session other than the bound one
    /// are dropped; returns whether the update was applied.
    pub fn apply(&mut self, update: &SessionUpdate) -> bool {
        if self.state.session_id != Some(update.session_id) {
            debug!(session = %update.session_id, "Dropping update from stale session");
            return false;
        }

        self.state.lines.truncate(update.retained);
        self.state.lines.extend(update.lines.iter().cloned());
        self.state.status = update.status;
        self.state.connection = update.connection;
        self.state.error = update.error;
        self.publish();
        true
    }

    /// Deterministic live site link
    pub fn artifact_url(&self) -> Option<String> {
        if self.state.status != DeploymentStatus::Success {
            return None;
        }
        let owner = self.owner_id.as_deref().filter(|s| !s.is_empty())?;
        let project = self.task.project_ref().filter(|s| !s.is_empty())?;
        Some(self.template.render(owner, project))
    }

    fn publish(&mut self) {
        self.state.artifact_url = self.artifact_url();
        self.tx.send_replace(self.state.clone());
    }
}
