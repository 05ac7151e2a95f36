//! Server-sent events transport

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, info};

use crate::authn::credentials::CredentialSource;
use crate::channel::{ChannelConnector, EventChannel};
use crate::errors::ObserverError;
use crate::http::client::HttpClient;
use crate::models::frame::RawFrame;

/// Event names that carry log frames. Unnamed events arrive as `message`.
const LOG_EVENTS: [&str; 2] = ["message", "log"];

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Chunks may split lines (or UTF-8 sequences) anywhere; incomplete lines are
/// kept until the rest arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// Open server-sent events subscription
pub struct SseChannel {
    body: BoxStream<'static, Result<Vec<u8>, ObserverError>>,
    decoder: SseDecoder,
    queued: VecDeque<RawFrame>,
    closed: bool,
}

impl SseChannel {
    pub fn new(body: BoxStream<'static, Result<Vec<u8>, ObserverError>>) -> Self {
        Self {
            body,
            decoder: SseDecoder::new(),
            queued: VecDeque::new(),
            closed: false,
        }
    }
}

#[async_trait]
impl EventChannel for SseChannel {
    async fn next_frame(&mut self) -> Option<Result<RawFrame, ObserverError>> {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Some(Ok(frame));
            }
            if self.closed {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    for event in self.decoder.feed(&chunk) {
                        if LOG_EVENTS.contains(&event.event.as_str()) {
                            self.queued.push_back(RawFrame::Text(event.data));
                        } else {
                            debug!("Ignoring SSE event '{}'", event.event);
                        }
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed && self.queued.is_empty() {
            return;
        }
        self.closed = true;
        self.queued.clear();
        // dropping the body releases the HTTP connection
        self.body = stream::empty().boxed();
    }
}

/// Connects to `GET {base}{path}` as an event stream
pub struct SseConnector {
    client: HttpClient,
    path_template: String,
    credentials: Arc<dyn CredentialSource>,
}

impl SseConnector {
    pub fn new(
        client: HttpClient,
        path_template: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            client,
            path_template: path_template.into(),
            credentials,
        }
    }
}

#[async_trait]
impl ChannelConnector for SseConnector {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn EventChannel>, ObserverError> {
        let url = self.client.endpoint(&self.path_template, task_id)?;
        let token = self.credentials.bearer_token().await?;

        info!("Connecting to log stream: {}", url);
        let response = self.client.open_stream(url, &token).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ObserverError::from))
            .boxed();
        Ok(Box::new(SseChannel::new(body)))
    }
}
