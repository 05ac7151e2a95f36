//! Deployment observer library
//!
//! Follows a deployment's build output over a push channel or by polling,
//! infers its outcome and keeps a render-ready view of it.

pub mod app;
pub mod authn;
pub mod channel;
pub mod context;
pub mod errors;
pub mod http;
pub mod logs;
pub mod models;
pub mod observe;
pub mod utils;
pub mod workers;
