//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::authn::credentials::authorization_header;
use crate::errors::ObserverError;

/// HTTP client for one backend base URL
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// `request_timeout` bounds request/response calls only; long-lived
    /// streams opened with `open_stream` have no overall deadline.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ObserverError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ObserverError::ConfigError(format!("Invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ObserverError::ConfigError(format!(
                "Base URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    /// Resolve a path template such as `/api/builds/tasks/{task_id}/logs`.
    /// The task id is inserted as one percent-encoded path segment.
    pub fn endpoint(&self, template: &str, task_id: &str) -> Result<Url, ObserverError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ObserverError::ConfigError(format!("Base URL cannot carry a path: {}", self.base_url))
            })?;
            segments.pop_if_empty();
            for segment in template.split('/').filter(|s| !s.is_empty()) {
                if segment == "{task_id}" {
                    segments.push(task_id);
                } else {
                    segments.push(segment);
                }
            }
        }
        Ok(url)
    }

    fn authorized(request: RequestBuilder, token: &SecretString) -> RequestBuilder {
        match authorization_header(token) {
            Some(value) => request.header(header::AUTHORIZATION, value),
            None => request,
        }
    }

    async fn check(response: Response, method: &str) -> Result<Response, ObserverError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            debug!("HTTP {} {} returned 404", method, url);
            return Err(ObserverError::NotFound(format!("{}: {}", status, body)));
        }

        error!("HTTP {} failed: {} - {}", method, status, body);
        Err(ObserverError::TransportError(format!("{}: {}", status, body)))
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &SecretString,
    ) -> Result<T, ObserverError> {
        debug!("GET {}", url);

        let request = self.client.get(url).timeout(self.request_timeout);
        let response = Self::authorized(request, token).send().await?;
        let response = Self::check(response, "GET").await?;

        let body = response.json().await?;
        Ok(body)
    }

    /// Open a long-lived streaming GET (server-sent events)
    pub async fn open_stream(
        &self,
        url: Url,
        token: &SecretString,
    ) -> Result<Response, ObserverError> {
        debug!("GET {} (stream)", url);

        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        let response = Self::authorized(request, token).send().await?;
        Self::check(response, "GET").await
    }
}
