//! Task handle

use serde::{Deserialize, Serialize};

/// Identifies one deployment/build execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Opaque task identifier issued when the deployment was triggered
    task_id: String,

    /// Project name, used for post-success artifact links
    project_ref: Option<String>,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            project_ref: None,
        }
    }

    pub fn with_project(task_id: impl Into<String>, project_ref: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            project_ref: Some(project_ref.into()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn project_ref(&self) -> Option<&str> {
        self.project_ref.as_deref()
    }

    /// A handle with a blank id cannot be observed
    pub fn is_addressable(&self) -> bool {
        !self.task_id.trim().is_empty()
    }
}
