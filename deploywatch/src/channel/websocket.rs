//! WebSocket transport

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use http::{header, HeaderValue};
use secrecy::SecretString;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::authn::credentials::{authorization_header, CredentialSource};
use crate::channel::{ChannelConnector, EventChannel};
use crate::errors::ObserverError;
use crate::http::client::HttpClient;
use crate::models::frame::RawFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open WebSocket subscription
pub struct WebSocketChannel {
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl EventChannel for WebSocketChannel {
    async fn next_frame(&mut self) -> Option<Result<RawFrame, ObserverError>> {
        if self.closed {
            return None;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Ok(RawFrame::Text(text.as_str().to_string())));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Some(Ok(RawFrame::Binary(bytes.to_vec())));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Log channel closed by server: {:?}", frame);
                    self.closed = true;
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(e.into())),
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            warn!("Failed to close log channel cleanly: {}", e);
        }
    }
}

/// Connects to the WebSocket flavour of the log endpoint
pub struct WebSocketConnector {
    client: HttpClient,
    path_template: String,
    credentials: Arc<dyn CredentialSource>,
}

impl WebSocketConnector {
    /// `client` carries the HTTP base URL; its scheme is switched to ws/wss
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

/// Switch http/https to ws/wss
pub fn to_websocket_url(mut url: Url) -> Result<Url, ObserverError> {
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ObserverError::ConfigError(format!(
                "Invalid stream URL scheme: {}",
                other
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| ObserverError::ConfigError("Failed to set scheme".to_string()))?;
    Ok(url)
}

fn build_request(
    url: &Url,
    token: &SecretString,
) -> Result<http::Request<()>, ObserverError> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(value) = authorization_header(token) {
        let value = HeaderValue::from_str(&value)
            .map_err(|e| ObserverError::ConfigError(format!("Invalid bearer token: {}", e)))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
    }
    Ok(request)
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn EventChannel>, ObserverError> {
        let url = to_websocket_url(self.client.endpoint(&self.path_template, task_id)?)?;
        let token = self.credentials.bearer_token().await?;
        let request = build_request(&url, &token)?;

        info!("Connecting to log channel: {}", url);
        let (stream, response) = connect_async(request).await.map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Http(response)
                if response.status() == http::StatusCode::NOT_FOUND =>
            {
                ObserverError::NotFound(format!("no log channel for task {}", task_id))
            }
            other => ObserverError::from(other),
        })?;
        debug!("Log channel handshake status: {}", response.status());

        Ok(Box::new(WebSocketChannel {
            stream,
            closed: false,
        }))
    }
}
