//! Settings file management

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::ChannelTransport;
use crate::errors::ObserverError;
use crate::logs::LogLevel;
use crate::observe::inference::SentinelMarkers;
use crate::observe::view::ArtifactLinkTemplate;

/// Observer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for a rolling log file
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Push channel configuration
    #[serde(default)]
    pub stream: StreamSettings,

    /// Snapshot endpoint configuration
    #[serde(default)]
    pub poll: PollSettings,

    /// Outcome tokens embedded in plain build output
    #[serde(default)]
    pub sentinels: SentinelMarkers,

    /// Live site link template
    #[serde(default)]
    pub artifact_url_template: ArtifactLinkTemplate,

    /// Deadline of one request/response call in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            log_dir: None,
            stream: StreamSettings::default(),
            poll: PollSettings::default(),
            sentinels: SentinelMarkers::default(),
            artifact_url_template: ArtifactLinkTemplate::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ObserverError> {
        let path = path.as_ref();
        debug!("Reading settings from {}", path.display());
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ObserverError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Base URL of the build log service
    #[serde(default = "default_stream_url")]
    pub base_url: String,

    /// Path of the per-task log channel
    #[serde(default = "default_stream_path")]
    pub path_template: String,

    /// Transport the channel is served over
    #[serde(default)]
    pub transport: ChannelTransport,
}

fn default_stream_url() -> String {
    "http://localhost:9001".to_string()
}

fn default_stream_path() -> String {
    "/api/v2/buildLogs/{task_id}/logs".to_string()
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_stream_url(),
            path_template: default_stream_path(),
            transport: ChannelTransport::default(),
        }
    }
}

/// Snapshot endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Base URL of the build server
    #[serde(default = "default_poll_url")]
    pub base_url: String,

    /// Path returning the task's lines as a JSON array
    #[serde(default = "default_poll_path")]
    pub path_template: String,

    /// Path returning a `{logs, status}` report, served by the log service
    #[serde(default = "default_report_path")]
    pub report_path_template: String,

    /// Refresh interval in seconds
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Refresh on a timer without being asked
    #[serde(default)]
    pub auto_refresh: bool,

    /// Stop refreshing once the deployment finished
    #[serde(default = "default_true")]
    pub stop_on_terminal: bool,

    /// Read the report endpoint instead of the line list
    #[serde(default)]
    pub use_report_endpoint: bool,
}

fn default_true() -> bool {
    true
}

fn default_poll_url() -> String {
    "http://localhost:9191".to_string()
}

fn default_poll_path() -> String {
    "/api/builds/tasks/{task_id}/logs".to_string()
}

fn default_report_path() -> String {
    "/api/v2/buildLogs/{task_id}/status".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_url: default_poll_url(),
            path_template: default_poll_path(),
            report_path_template: default_report_path(),
            interval_secs: default_poll_interval(),
            auto_refresh: false,
            stop_on_terminal: true,
            use_report_endpoint: false,
        }
    }
}
