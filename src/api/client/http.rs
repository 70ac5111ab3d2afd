//! HTTP client implementation
//!
//! Talks to a running server through the JSON API.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Client;
use crate::api::server::{
    ContextsResponse, ItemsRequest, MoveRequest, NestRequest, ToggleRequest, ToggleResponse,
};
use crate::models::{ContextId, HierarchyError, ItemDescriptor, NodeId};
use crate::persist::PersistedTree;
use crate::projection::ProjectedNode;
use crate::reconcile::ReconcileReport;
use crate::session::TransitionLogEntry;
use crate::settings::Settings;

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("Invalid server URL '{0}'")]
    InvalidUrl(String),

    #[error("API error: {0}")]
    Api(String),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for a running hierarchy server
#[derive(Debug, Clone)]
pub struct HttpClientImpl {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Default for HttpClientImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientImpl {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    /// Joins `segments` onto the base URL, percent-encoding each one
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|_| ClientError::InvalidUrl(self.config.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn context_url(&self, context: &str, action: Option<&str>) -> Result<Url, ClientError> {
        let mut segments = vec!["api", "contexts", context];
        segments.extend(action);
        self.url(&segments)
    }

    /// Sends a request and unwraps the response envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let api_response: ApiResponse<T> = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Api(format!("HTTP error: {}", status)));
            }
            Err(e) => return Err(ClientError::Api(format!("Malformed response: {}", e))),
        };

        if api_response.success {
            api_response.data.ok_or(ClientError::MissingData)
        } else {
            Err(ClientError::Api(
                api_response
                    .error
                    .unwrap_or_else(|| format!("Unknown API error (status {})", status)),
            ))
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.http_client.post(url).json(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        self.send(self.http_client.get(url)).await
    }
}

#[async_trait::async_trait]
impl Client for HttpClientImpl {
    async fn list_contexts(&self) -> Result<ContextsResponse, ClientError> {
        self.get(self.url(&["api", "contexts"])?).await
    }

    async fn activate(
        &self,
        context: &str,
        items: Vec<ItemDescriptor>,
    ) -> Result<ReconcileReport, ClientError> {
        let url = self.context_url(context, Some("activate"))?;
        self.post(url, &ItemsRequest { items }).await
    }

    async fn sync(
        &self,
        context: &str,
        items: Vec<ItemDescriptor>,
    ) -> Result<ReconcileReport, ClientError> {
        let url = self.context_url(context, Some("items"))?;
        self.post(url, &ItemsRequest { items }).await
    }

    async fn tree(&self, context: &str) -> Result<PersistedTree, ClientError> {
        self.get(self.context_url(context, Some("tree"))?).await
    }

    async fn projection(&self, context: &str) -> Result<Vec<ProjectedNode>, ClientError> {
        self.get(self.context_url(context, Some("projection"))?)
            .await
    }

    async fn move_node(
        &self,
        context: &str,
        node: &str,
        from_index: usize,
        to_index: usize,
        parent: Option<NodeId>,
    ) -> Result<PersistedTree, ClientError> {
        let request = MoveRequest {
            node: node.to_string(),
            from_index,
            to_index,
            parent,
        };
        let url = self.context_url(context, Some("move"))?;
        self.post(url, &request).await
    }

    async fn nest_node(
        &self,
        context: &str,
        node: &str,
        target: &str,
    ) -> Result<PersistedTree, ClientError> {
        let request = NestRequest {
            node: node.to_string(),
            target: target.to_string(),
        };
        let url = self.context_url(context, Some("nest"))?;
        self.post(url, &request).await
    }

    async fn toggle_collapse(
        &self,
        context: &str,
        node: &str,
    ) -> Result<ToggleResponse, ClientError> {
        let request = ToggleRequest {
            node: node.to_string(),
        };
        let url = self.context_url(context, Some("toggle"))?;
        self.post(url, &request).await
    }

    async fn evict(&self, context: &str) -> Result<(), ClientError> {
        let url = self.context_url(context, None)?;
        let _: ContextId = self.send(self.http_client.delete(url)).await?;
        Ok(())
    }

    async fn settings(&self) -> Result<Settings, ClientError> {
        self.get(self.url(&["api", "settings"])?).await
    }

    async fn history(&self) -> Result<Vec<TransitionLogEntry>, ClientError> {
        self.get(self.url(&["api", "history"])?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_url_encodes_segments() {
        let client = HttpClientImpl::with_config(ClientConfig {
            base_url: "http://localhost:3000/".to_string(),
        });

        let url = client.context_url("my char", Some("tree")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/contexts/my%20char/tree"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let client = HttpClientImpl::with_config(ClientConfig {
            base_url: "not a url".to_string(),
        });
        assert!(matches!(
            client.url(&["api"]),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
