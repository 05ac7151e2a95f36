//! Status inference from structured records and sentinel lines

use serde::{Deserialize, Serialize};

use crate::models::frame::Frame;
use crate::models::status::DeploymentStatus;

/// Marker tokens embedded in plain build output to announce the outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelMarkers {
    /// Tokens announcing success
    #[serde(default = "default_success_markers")]
    pub success: Vec<String>,

    /// Tokens announcing failure
    #[serde(default = "default_failure_markers")]
    pub failure: Vec<String>,
}

fn default_success_markers() -> Vec<String> {
    vec![
        "__BUILD_STATUS__:SUCCESS".to_string(),
        "__DONE__:SUCCESS".to_string(),
    ]
}

fn default_failure_markers() -> Vec<String> {
    vec![
        "__BUILD_STATUS__:FAILED".to_string(),
        "__DONE__:FAILED".to_string(),
    ]
}

impl Default for SentinelMarkers {
    fn default() -> Self {
        Self {
            success: default_success_markers(),
            failure: default_failure_markers(),
        }
    }
}

impl SentinelMarkers {
    /// Scan one line. Failure tokens are checked first.
    pub fn scan(&self, text: &str) -> Option<DeploymentStatus> {
        let hit = |tokens: &[String]| tokens.iter().any(|t| !t.is_empty() && text.contains(t));
        if hit(&self.failure) {
            Some(DeploymentStatus::Failed)
        } else if hit(&self.success) {
            Some(DeploymentStatus::Success)
        } else {
            None
        }
    }
}

/// What a frame says about the deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inference {
    /// `None` means no new information, never "back to pending"
    pub status: Option<DeploymentStatus>,
    pub is_terminal: bool,
}

impl Inference {
    fn from_status(status: Option<DeploymentStatus>) -> Self {
        Self {
            status,
            is_terminal: status.is_some_and(|s| s.is_terminal()),
        }
    }
}

/// Derives status from either wire shape
#[derive(Debug, Clone, Default)]
pub struct StatusInference {
    markers: SentinelMarkers,
}

impl StatusInference {
    pub fn new(markers: SentinelMarkers) -> Self {
        Self { markers }
    }

    /// Classify one decoded frame
    pub fn classify(&self, frame: &Frame) -> Inference {
        let status = match frame {
            Frame::Structured { status, .. } => {
                status.as_deref().and_then(DeploymentStatus::from_wire)
            }
            Frame::PlainText { text } => self.markers.scan(text),
        };
        Inference::from_status(status)
    }

    /// Classify a full line snapshot that came without a status field.
    /// Any failure token anywhere wins over success tokens.
    pub fn classify_lines(&self, lines: &[String]) -> Inference {
        let mut status = None;
        for line in lines {
            match self.markers.scan(line) {
                Some(DeploymentStatus::Failed) => {
                    status = Some(DeploymentStatus::Failed);
                    break;
                }
                Some(found) => status = Some(found),
                None => {}
            }
        }
        Inference::from_status(status)
    }
}
