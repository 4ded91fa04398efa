use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::model::{ResourceDraft, ResourceRecord};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// The server collaborator, seen through the four operations the engine
/// needs. Object-safe so tests can inject a scripted implementation.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Full collection snapshot, in server order.
    async fn fetch_collection(&self) -> Result<Vec<ResourceRecord>, BackendError>;

    async fn create_resource(&self, draft: &ResourceDraft) -> Result<ResourceRecord, BackendError>;

    async fn update_resource(
        &self,
        record: &ResourceRecord,
    ) -> Result<ResourceRecord, BackendError>;

    async fn delete_resource(&self, id: &str) -> Result<(), BackendError>;
}

/// `ResourceBackend` over plain HTTP.
pub struct HttpResourceBackend {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpResourceBackend {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, BackendError> {
        let raw = base_url.as_ref().trim();
        if raw.is_empty() {
            return Err(BackendError::InvalidConfig(
                "backend base url cannot be empty".into(),
            ));
        }
        let parsed = Url::parse(raw)
            .map_err(|err| BackendError::InvalidConfig(format!("invalid backend url: {err}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self {
            client,
            base_url: parsed,
            bearer_token: None,
        })
    }

    /// Token passthrough only; minting and refreshing tokens is the auth
    /// collaborator's problem.
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    fn collection_url(&self) -> Result<Url, BackendError> {
        self.base_url.join("resources").map_err(|err| {
            BackendError::InvalidConfig(format!("invalid resources endpoint: {err}"))
        })
    }

    fn resource_url(&self, id: &str) -> Result<Url, BackendError> {
        self.base_url.join(&format!("resources/{id}")).map_err(|err| {
            BackendError::InvalidConfig(format!("invalid endpoint for resource {id}: {err}"))
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ResourceBackend for HttpResourceBackend {
    async fn fetch_collection(&self) -> Result<Vec<ResourceRecord>, BackendError> {
        let response = self
            .authorized(self.client.get(self.collection_url()?))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        let records = response.json::<Vec<ResourceRecord>>().await?;
        Ok(records)
    }

    async fn create_resource(&self, draft: &ResourceDraft) -> Result<ResourceRecord, BackendError> {
        let response = self
            .authorized(self.client.post(self.collection_url()?))
            .json(draft)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        let record = response.json::<ResourceRecord>().await?;
        Ok(record)
    }

    async fn update_resource(
        &self,
        record: &ResourceRecord,
    ) -> Result<ResourceRecord, BackendError> {
        let response = self
            .authorized(self.client.put(self.resource_url(&record.id)?))
            .json(record)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        let updated = response.json::<ResourceRecord>().await?;
        if updated.id != record.id {
            return Err(BackendError::InvalidResponse(format!(
                "id mismatch: sent {}, got {}",
                record.id, updated.id
            )));
        }
        Ok(updated)
    }

    async fn delete_resource(&self, id: &str) -> Result<(), BackendError> {
        let response = self
            .authorized(self.client.delete(self.resource_url(id)?))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        Ok(())
    }
}
