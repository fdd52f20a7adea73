// ============================================================================
// REST collaborator for the platform backend
// ============================================================================

use super::{EntityApi, EntitySource, FetchQuery};
use crate::config::StoreConfig;
use crate::core::{EntityId, EntityKind, FetchError, MutationError, StoreError};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{Value as Json, json};

/// HTTP client for the platform API (`/api/...` endpoints).
///
/// Transport concerns (verbs, bearer token, status mapping) stay here; the
/// store only sees JSON payloads and [`FetchError`]s.
#[derive(Debug, Clone)]
pub struct RestSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn from_config(config: &StoreConfig) -> crate::core::Result<Self> {
        let base_url = config
            .api_base_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("api_base_url is not configured".into()))?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| StoreError::Config(format!("http client: {}", err)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Collection endpoint for a kind. Recommendations are scoped by region
    /// when the query names one.
    fn collection_path(kind: EntityKind, query: &FetchQuery) -> String {
        match kind {
            EntityKind::Regions => "/agroclimate/regions".to_string(),
            EntityKind::Recommendations => match &query.region_id {
                Some(region_id) => format!("/agroclimate/crop-recommendations/{}", region_id),
                None => "/agroclimate/crop-recommendations".to_string(),
            },
            EntityKind::Warehouses => "/storage/warehouses".to_string(),
            EntityKind::StorageRequests => "/storage/storage-requests".to_string(),
            EntityKind::Posts => "/market/posts".to_string(),
            EntityKind::Saccos => "/sacco/saccos".to_string(),
            EntityKind::Memberships => "/sacco/membership".to_string(),
            EntityKind::LoanApplications => "/sacco/loan-applications".to_string(),
        }
    }

    fn item_path(kind: EntityKind, id: &EntityId) -> String {
        let base = Self::collection_path(kind, &FetchQuery::default());
        format!("{}/{}", base, id)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Json, FetchError> {
        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;
        Self::read_body(response).await
    }

    async fn read_body(response: Response) -> Result<Json, FetchError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Json>(&text)
                .ok()
                .and_then(|body| body.get("message").and_then(Json::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("API request failed with status {}", status));
            return Err(FetchError::server(message));
        }

        if text.trim().is_empty() {
            return Ok(Json::Null);
        }
        serde_json::from_str(&text).map_err(FetchError::from)
    }
}

#[async_trait]
impl EntitySource for RestSource {
    async fn fetch(&self, kind: EntityKind, query: &FetchQuery) -> Result<Json, FetchError> {
        let path = Self::collection_path(kind, query);
        debug!("GET {} {:?}", path, query.pairs());
        let builder = self.request(Method::GET, &path).query(&query.pairs());
        self.send(builder).await
    }
}

#[async_trait]
impl EntityApi for RestSource {
    async fn create(&self, kind: EntityKind, payload: &Json) -> Result<Json, MutationError> {
        let path = Self::collection_path(kind, &FetchQuery::default());
        let builder = self.request(Method::POST, &path).json(payload);
        Ok(self.send(builder).await?)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        payload: &Json,
    ) -> Result<Json, MutationError> {
        let builder = self
            .request(Method::PUT, &Self::item_path(kind, id))
            .json(payload);
        Ok(self.send(builder).await?)
    }

    async fn delete(&self, kind: EntityKind, id: &EntityId) -> Result<(), MutationError> {
        let builder = self.request(Method::DELETE, &Self::item_path(kind, id));
        self.send(builder).await?;
        Ok(())
    }

    async fn update_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        status: &str,
    ) -> Result<(), MutationError> {
        let path = format!("{}/status", Self::item_path(kind, id));
        let body = match kind {
            EntityKind::Warehouses | EntityKind::Saccos => json!({ "is_active": status == "active" }),
            _ => json!({ "status": status }),
        };
        let builder = self.request(Method::PUT, &path).json(&body);
        self.send(builder).await?;
        Ok(())
    }

    async fn express_interest(&self, post_id: &EntityId, message: &str) -> Result<(), MutationError> {
        let path = format!("/market/posts/{}/interest", post_id);
        let builder = self
            .request(Method::POST, &path)
            .json(&json!({ "message": message }));
        self.send(builder).await?;
        Ok(())
    }
}
