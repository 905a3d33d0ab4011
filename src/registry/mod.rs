pub mod http;

use async_trait::async_trait;

use crate::model::extension::{ExtensionId, ExtensionPatch};

pub use http::OpenVsxClient;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {url}")]
    NotFound { url: String },
    #[error("registry returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("registry request failed: {0}")]
    Transport(String),
    #[error("malformed registry response: {0}")]
    Decode(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

/// One hit of a registry search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSummary {
    pub publisher: String,
    pub name: String,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub download_url: Option<String>,
}

/// Full metadata for a single extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDetail {
    pub summary: ExtensionSummary,
    pub readme_url: Option<String>,
}

impl ExtensionSummary {
    pub fn id(&self) -> Result<ExtensionId, crate::model::extension::InvalidExtensionId> {
        ExtensionId::from_parts(&self.publisher, &self.name)
    }

    pub fn to_patch(&self) -> ExtensionPatch {
        ExtensionPatch {
            publisher: Some(self.publisher.clone()),
            name: Some(self.name.clone()),
            display_name: self.display_name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            icon_url: self.icon_url.clone(),
            download_url: self.download_url.clone(),
            ..Default::default()
        }
    }
}

impl ExtensionDetail {
    pub fn to_patch(&self) -> ExtensionPatch {
        ExtensionPatch {
            readme_url: self.readme_url.clone(),
            ..self.summary.to_patch()
        }
    }
}

/// Remote extension registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<ExtensionSummary>, RegistryError>;

    /// Fails with [`RegistryError::NotFound`] when the id is unknown.
    async fn get_extension(&self, id: &ExtensionId) -> Result<ExtensionDetail, RegistryError>;

    async fn fetch_text(&self, url: &str) -> Result<String, RegistryError>;
}
