//! Build log endpoints

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::authn::credentials::CredentialSource;
use crate::errors::ObserverError;
use crate::http::client::HttpClient;
use crate::models::snapshot::LogSnapshot;
use crate::workers::poller::LogFetcher;

/// Which request/response endpoint a poll session reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollEndpoint {
    /// Plain `string[]` of lines; status is inferred from sentinel lines
    Lines { path_template: String },

    /// `{logs, status}` record for backends that cannot stream
    Report { path_template: String },
}

impl HttpClient {
    /// Fetch the full line list of a task
    pub async fn fetch_task_logs(
        &self,
        path_template: &str,
        task_id: &str,
        token: &SecretString,
    ) -> Result<Vec<String>, ObserverError> {
        let url = self.endpoint(path_template, task_id)?;
        let logs: Option<Vec<String>> = self.get(url, token).await?;
        Ok(logs.unwrap_or_default())
    }

    /// Fetch a `{logs, status}` report of a task
    pub async fn fetch_build_report(
        &self,
        path_template: &str,
        task_id: &str,
        token: &SecretString,
    ) -> Result<LogSnapshot, ObserverError> {
        let url = self.endpoint(path_template, task_id)?;
        self.get(url, token).await
    }
}

/// `LogFetcher` backed by the HTTP endpoints
pub struct HttpLogFetcher {
    client: HttpClient,
    endpoint: PollEndpoint,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpLogFetcher {
    pub fn new(
        client: HttpClient,
        endpoint: PollEndpoint,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            client,
            endpoint,
            credentials,
        }
    }
}

#[async_trait]
impl LogFetcher for HttpLogFetcher {
    async fn fetch(&self, task_id: &str) -> Result<LogSnapshot, ObserverError> {
        let token = self.credentials.bearer_token().await?;
        match &self.endpoint {
            PollEndpoint::Lines { path_template } => {
                let logs = self
                    .client
                    .fetch_task_logs(path_template, task_id, &token)
                    .await?;
                Ok(LogSnapshot::lines_only(logs))
            }
            PollEndpoint::Report { path_template } => {
                self.client
                    .fetch_build_report(path_template, task_id, &token)
                    .await
            }
        }
    }
}
