//! HTTP access to the build backend

pub mod client;
pub mod logs;
