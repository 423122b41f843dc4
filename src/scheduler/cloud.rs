use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{Job, SchedulerClient, SchedulerError};
use crate::{
    config::SchedulerConfig,
    metadata::MetadataClient,
    observability::{propagation, TraceContext},
};

enum Credentials {
    Static(String),
    Metadata(Arc<MetadataClient>),
}

/// Cloud Scheduler v1 REST client
pub struct CloudSchedulerClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    credentials: Credentials,
}

impl CloudSchedulerClient {
    pub fn new(client: Client, config: &SchedulerConfig, metadata: Arc<MetadataClient>) -> Self {
        let credentials = match &config.access_token {
            Some(token) => Credentials::Static(token.clone()),
            None => Credentials::Metadata(metadata),
        };

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_seconds),
            credentials,
        }
    }

    fn job_url(&self, name: &str) -> String {
        format!("{}/v1/{}", self.base_url, name)
    }

    async fn bearer_token(&self) -> Result<String, SchedulerError> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Metadata(metadata) => metadata
                .access_token()
                .await
                .map_err(|e| SchedulerError::Auth(e.to_string())),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        name: &str,
        trace: &TraceContext,
    ) -> Result<reqwest::Response, SchedulerError> {
        let response = request
            .bearer_auth(self.bearer_token().await?)
            .headers(propagation::inject(trace))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(SchedulerError::NotFound(name.to_string()));
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(SchedulerError::Api { status, message })
    }
}

#[async_trait]
impl SchedulerClient for CloudSchedulerClient {
    async fn delete_job(&self, name: &str, trace: &TraceContext) -> Result<(), SchedulerError> {
        self.send(self.client.delete(self.job_url(name)), name, trace)
            .await?;
        Ok(())
    }

    async fn get_job(&self, name: &str, trace: &TraceContext) -> Result<Job, SchedulerError> {
        let response = self
            .send(self.client.get(self.job_url(name)), name, trace)
            .await?;
        Ok(response.json().await?)
    }
}
