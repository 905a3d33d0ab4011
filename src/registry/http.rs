use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::model::config::RegistryConfig;
use crate::model::extension::ExtensionId;
use crate::registry::{ExtensionDetail, ExtensionSummary, RegistryClient, RegistryError};

/// Registry client for Open VSX compatible servers.
#[derive(Debug, Clone)]
pub struct OpenVsxClient {
    http: reqwest::Client,
    base_url: String,
    search_size: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    extensions: Vec<RawExtension>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtension {
    namespace: String,
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: RawFiles,
}

#[derive(Debug, Default, Deserialize)]
struct RawFiles {
    #[serde(default)]
    download: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    readme: Option<String>,
}

impl RawExtension {
    fn into_detail(self) -> ExtensionDetail {
        ExtensionDetail {
            readme_url: self.files.readme,
            summary: ExtensionSummary {
                publisher: self.namespace,
                name: self.name,
                version: self.version,
                display_name: self.display_name,
                description: self.description,
                icon_url: self.files.icon,
                download_url: self.files.download,
            },
        }
    }
}

impl OpenVsxClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| RegistryError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            search_size: config.search_size,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, RegistryError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| RegistryError::Transport(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                url: url.to_string(),
            }),
            status if !status.is_success() => Err(RegistryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => Ok(response),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RegistryError> {
        let body = self
            .get(url, query)
            .await?
            .text()
            .await
            .map_err(|err| RegistryError::Transport(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| RegistryError::Decode(err.to_string()))
    }
}

#[async_trait]
impl RegistryClient for OpenVsxClient {
    async fn search(&self, query: &str) -> Result<Vec<ExtensionSummary>, RegistryError> {
        let url = self.api_url("-/search");
        let response: SearchResponse = self
            .get_json(
                &url,
                &[
                    ("query", query.to_string()),
                    ("size", self.search_size.to_string()),
                ],
            )
            .await?;

        Ok(response
            .extensions
            .into_iter()
            .map(|raw| raw.into_detail().summary)
            .collect())
    }

    async fn get_extension(&self, id: &ExtensionId) -> Result<ExtensionDetail, RegistryError> {
        let url = self.api_url(&format!("{}/{}", id.publisher(), id.name()));
        let raw: RawExtension = self.get_json(&url, &[]).await?;
        Ok(raw.into_detail())
    }

    async fn fetch_text(&self, url: &str) -> Result<String, RegistryError> {
        self.get(url, &[])
            .await?
            .text()
            .await
            .map_err(|err| RegistryError::Transport(err.to_string()))
    }
}
