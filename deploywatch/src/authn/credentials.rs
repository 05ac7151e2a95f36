//! Bearer credentials supplied by the authentication collaborator

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::ObserverError;

/// Read-only source of the caller's identity and bearer token
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current bearer token
    async fn bearer_token(&self) -> Result<SecretString, ObserverError>;

    /// Id of the signed-in user, used to build artifact links
    fn owner_id(&self) -> Option<String>;
}

/// Credentials fixed for the lifetime of the process
pub struct StaticCredentials {
    token: SecretString,
    owner_id: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>, owner_id: Option<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            owner_id,
        }
    }

    /// No token at all; endpoints that do not check auth still work
    pub fn anonymous() -> Self {
        Self::new(String::new(), None)
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .finish()
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn bearer_token(&self) -> Result<SecretString, ObserverError> {
        Ok(SecretString::from(self.token.expose_secret().to_string()))
    }

    fn owner_id(&self) -> Option<String> {
        self.owner_id.clone()
    }
}

/// `Authorization` header value, or `None` when the token is empty
pub fn authorization_header(token: &SecretString) -> Option<String> {
    let raw = token.expose_secret();
    (!raw.is_empty()).then(|| format!("Bearer {}", raw))
}
