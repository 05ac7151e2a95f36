//! Log snapshots returned by request/response endpoints

use serde::{Deserialize, Serialize};

use crate::models::status::DeploymentStatus;

/// Authoritative full state of a task's log at fetch time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSnapshot {
    /// Every line the backend has for the task, in order
    #[serde(default)]
    pub logs: Vec<String>,

    /// Explicit status, when the endpoint reports one
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<DeploymentStatus>,
}

impl LogSnapshot {
    pub fn lines_only(logs: Vec<String>) -> Self {
        Self { logs, status: None }
    }
}

/// Unknown status strings count as "no status" rather than a decode failure
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<DeploymentStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(DeploymentStatus::from_wire))
}
