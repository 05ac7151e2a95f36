//! Deployment status

use serde::{Deserialize, Serialize};

/// Status of one deployment as seen by an observation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Triggered, nothing observed yet
    #[default]
    Pending,

    /// Build or deploy is running
    InProgress,

    /// Finished successfully
    Success,

    /// Finished with a failure
    Failed,
}

impl DeploymentStatus {
    /// Map a wire status value. `READY` is an alias some backends send for
    /// `SUCCESS`. Unknown values yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "READY" => Some(DeploymentStatus::Success),
            "FAILED" => Some(DeploymentStatus::Failed),
            "IN_PROGRESS" => Some(DeploymentStatus::InProgress),
            "PENDING" => Some(DeploymentStatus::Pending),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }

    /// Position along PENDING -> IN_PROGRESS -> terminal
    pub(crate) fn rank(&self) -> u8 {
        match self {
            DeploymentStatus::Pending => 0,
            DeploymentStatus::InProgress => 1,
            DeploymentStatus::Success | DeploymentStatus::Failed => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "PENDING",
            DeploymentStatus::InProgress => "IN_PROGRESS",
            DeploymentStatus::Success => "SUCCESS",
            DeploymentStatus::Failed => "FAILED",
        }
    }

    /// Headline shown next to the log view
    pub fn headline(&self) -> &'static str {
        match self {
            DeploymentStatus::Success => "Deployment Successful",
            DeploymentStatus::Failed => "Deployment Failed",
            _ => "Deployment In Progress",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
