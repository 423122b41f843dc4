//! GCE/Cloud Run metadata server client
//!
//! Used for the project id when none is configured, and for OAuth access
//! tokens of the attached service account.

use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct MetadataClient {
    client: Client,
    base_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl MetadataClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    /// Project id of the instance; fails fast when not running on Google Cloud
    pub async fn project_id(&self) -> anyhow::Result<String> {
        let project_id = self
            .client
            .get(format!("{}/computeMetadata/v1/project/project-id", self.base_url))
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .timeout(Duration::from_secs(2))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(project_id.trim().to_string())
    }

    /// Access token for the default service account, cached until shortly
    /// before expiry
    pub async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response: TokenResponse = self
            .client
            .get(format!(
                "{}/computeMetadata/v1/instance/service-accounts/default/token",
                self.base_url
            ))
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        tracing::debug!(expires_in = response.expires_in, "Fetched access token from metadata server");
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn test_project_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/project/project-id"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("my-project\n"))
            .mount(&server)
            .await;

        let client = MetadataClient::new(Client::new(), server.uri());
        assert_eq!(client.project_id().await.unwrap(), "my-project");
    }

    #[tokio::test]
    async fn test_access_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MetadataClient::new(Client::new(), server.uri());
        assert_eq!(client.access_token().await.unwrap(), "ya29.token");
        assert_eq!(client.access_token().await.unwrap(), "ya29.token");
    }

    #[tokio::test]
    async fn test_project_id_fails_off_gcp() {
        let server = MockServer::start().await;
        let client = MetadataClient::new(Client::new(), server.uri());
        assert!(client.project_id().await.is_err());
    }
}
