//! Observation data models

pub mod frame;
pub mod log_line;
pub mod snapshot;
pub mod status;
pub mod task;
