//! Monotonic state machine for deployment status

use chrono::{DateTime, Utc};

use crate::models::status::DeploymentStatus;

/// Outcome of feeding a status into the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved forward
    Advanced {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// Same status reported again
    Unchanged,
}

/// A rejected status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("status is already terminal ({current}), ignoring {requested}")]
    AlreadyTerminal {
        current: DeploymentStatus,
        requested: DeploymentStatus,
    },

    #[error("status cannot regress from {current} to {requested}")]
    Regression {
        current: DeploymentStatus,
        requested: DeploymentStatus,
    },
}

/// Status of one observation session.
///
/// Moves only along PENDING -> IN_PROGRESS -> {SUCCESS | FAILED}; skipping
/// ahead is allowed, going back or leaving a terminal status is not.
#[derive(Debug, Clone)]
pub struct StatusMachine {
    status: DeploymentStatus,
    terminal_at: Option<DateTime<Utc>>,
    transitions: u32,
}

impl StatusMachine {
    /// Create a new machine in pending state
    pub fn new() -> Self {
        Self {
            status: DeploymentStatus::Pending,
            terminal_at: None,
            transitions: 0,
        }
    }

    /// Get current status
    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// When the terminal status was reached
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.terminal_at
    }

    /// Number of accepted forward moves
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Feed a newly observed status
    pub fn advance(&mut self, next: DeploymentStatus) -> Result<Transition, TransitionError> {
        let current = self.status;

        if current.is_terminal() {
            if current == next {
                return Ok(Transition::Unchanged);
            }
            return Err(TransitionError::AlreadyTerminal {
                current,
                requested: next,
            });
        }

        if current == next {
            return Ok(Transition::Unchanged);
        }

        if next.rank() < current.rank() {
            return Err(TransitionError::Regression {
                current,
                requested: next,
            });
        }

        self.status = next;
        self.transitions += 1;
        if next.is_terminal() {
            self.terminal_at = Some(Utc::now());
        }

        Ok(Transition::Advanced {
            from: current,
            to: next,
        })
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}
