//! Deployment observation core

pub mod buffer;
pub mod fsm;
pub mod inference;
pub mod session;
pub mod view;
