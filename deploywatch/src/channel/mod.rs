//! Push transports for the per-task event channel

pub mod sse;
pub mod websocket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ObserverError;
use crate::models::frame::RawFrame;

/// An open subscription to one task's event channel
#[async_trait]
pub trait EventChannel: Send {
    /// Next raw frame. `None` once the remote end closed the channel.
    async fn next_frame(&mut self) -> Option<Result<RawFrame, ObserverError>>;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens event channels addressed by task id
#[async_trait]
pub trait ChannelConnector: Send + Sync + 'static {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn EventChannel>, ObserverError>;
}

/// Wire transport of the event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelTransport {
    /// Server-sent events over HTTP
    #[default]
    Sse,

    /// WebSocket text frames
    Websocket,
}
