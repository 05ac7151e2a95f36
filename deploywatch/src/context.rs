//! Explicit context handed to observation components

use std::sync::Arc;

use crate::authn::credentials::{CredentialSource, StaticCredentials};
use crate::observe::inference::{SentinelMarkers, StatusInference};
use crate::observe::view::ArtifactLinkTemplate;

/// Identity and policy shared by the controllers and the view.
///
/// Passed to constructors instead of being looked up globally, so a session
/// can be built in isolation.
#[derive(Clone)]
pub struct ObserverContext {
    pub credentials: Arc<dyn CredentialSource>,
    pub markers: SentinelMarkers,
    pub artifact_template: ArtifactLinkTemplate,
}

impl ObserverContext {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            credentials,
            markers: SentinelMarkers::default(),
            artifact_template: ArtifactLinkTemplate::default(),
        }
    }

    pub fn inference(&self) -> StatusInference {
        StatusInference::new(self.markers.clone())
    }

    pub fn owner_id(&self) -> Option<String> {
        self.credentials.owner_id()
    }
}

impl Default for ObserverContext {
    fn default() -> Self {
        Self::new(Arc::new(StaticCredentials::anonymous()))
    }
}

impl std::fmt::Debug for ObserverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverContext")
            .field("owner_id", &self.owner_id())
            .field("markers", &self.markers)
            .field("artifact_template", &self.artifact_template)
            .finish()
    }
}
