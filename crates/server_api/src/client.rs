use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sync_protocol::{
    CredentialProvider, FetchedContent, Profile, ResourceKey, ResourceMetadata, ResourceSource,
    Session, SourceError,
};
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::headers::{build_headers, to_header_map, ACCEPT_ANY, ACCEPT_JSON};
use crate::url::{content_url, metadata_url, profiles_url, sessions_url};

/// REST client for metadata, content, sessions and profiles.
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    profile: &'a str,
}

impl ApiClient {
    pub fn new(
        config: ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn list_metadata(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceMetadata>, ApiError> {
        let url = metadata_url(&self.config.base_url, collection_id)?;
        self.get_json(url).await
    }

    /// Fetches the raw body together with its declared content type.
    pub async fn fetch_content(&self, key: &ResourceKey) -> Result<FetchedContent, ApiError> {
        let url = content_url(&self.config.base_url, key)?;
        let response = self.send(self.http.get(url), ACCEPT_ANY).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await?;
        Ok(FetchedContent::new(bytes.to_vec(), content_type.as_deref()))
    }

    pub async fn list_sessions(
        &self,
        resource_id: &str,
        profile: &str,
    ) -> Result<Vec<Session>, ApiError> {
        let url = sessions_url(&self.config.base_url, resource_id, profile)?;
        self.get_json(url).await
    }

    pub async fn create_session(
        &self,
        resource_id: &str,
        profile: &str,
    ) -> Result<Session, ApiError> {
        let url = sessions_url(&self.config.base_url, resource_id, profile)?;
        let request = self
            .http
            .post(url)
            .json(&CreateSessionRequest { profile });
        let response = self.send(request, ACCEPT_JSON).await?;
        decode_json(response).await
    }

    pub async fn list_profiles(&self, resource_id: &str) -> Result<Vec<Profile>, ApiError> {
        let url = profiles_url(&self.config.base_url, resource_id)?;
        self.get_json(url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.send(self.http.get(url), ACCEPT_JSON).await?;
        decode_json(response).await
    }

    /// Attaches a fresh credential and turns non-2xx responses into errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        accept: &str,
    ) -> Result<Response, ApiError> {
        let token = self
            .credentials
            .bearer_token()
            .await?
            .ok_or(ApiError::MissingCredential)?;
        let headers = to_header_map(build_headers(&self.config, &token, accept)?)?;

        let response = request.headers(headers).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        tracing::debug!(status = status.as_u16(), error = %error, "request rejected");
        Err(error)
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl ResourceSource for ApiClient {
    async fn list_metadata(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceMetadata>, SourceError> {
        ApiClient::list_metadata(self, collection_id)
            .await
            .map_err(SourceError::from)
    }

    async fn fetch_content(&self, key: &ResourceKey) -> Result<FetchedContent, SourceError> {
        ApiClient::fetch_content(self, key)
            .await
            .map_err(SourceError::from)
    }
}
