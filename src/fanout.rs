use axum::http::StatusCode;
use futures::future::try_join_all;
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::{
    config::FanoutConfig,
    metrics,
    observability::{propagation, SpanAttribute, SpanGuard, SpanKind},
};

/// Failure of a single fan-out call; any one of these aborts the whole fan-out
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Transport failure (connect, TLS, timeout)
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Target answered with a non-2xx status
    #[error("{url} returned {status}")]
    UpstreamStatus { url: String, status: StatusCode },

    /// Headers arrived but the body could not be read
    #[error("reading body from {url} failed: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fan-out deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl FanoutError {
    fn outcome(&self) -> &'static str {
        match self {
            FanoutError::Network { .. } => "network_error",
            FanoutError::UpstreamStatus { .. } => "upstream_status",
            FanoutError::BodyRead { .. } => "body_read_error",
            FanoutError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }
}

/// Issues one GET per target and aggregates the bodies in target order
///
/// Calls run concurrently. The first failure drops the remaining
/// in-flight calls, which closes their connections; no partial result is
/// ever returned. Dropping the returned future (e.g. the inbound client
/// disconnected) cancels every outbound call the same way.
#[derive(Clone)]
pub struct FanoutAggregator {
    client: Client,
    request_timeout: Duration,
    deadline: Duration,
}

impl FanoutAggregator {
    pub fn new(client: Client, config: &FanoutConfig) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            deadline: Duration::from_secs(config.deadline_seconds),
        }
    }

    pub async fn fanout(
        &self,
        parent: &SpanGuard,
        targets: &[String],
    ) -> Result<Vec<String>, FanoutError> {
        let start = Instant::now();
        let calls = targets.iter().map(|url| self.fetch(parent, url));

        let result = match tokio::time::timeout(self.deadline, try_join_all(calls)).await {
            Ok(result) => result,
            Err(_) => Err(FanoutError::DeadlineExceeded(self.deadline)),
        };

        metrics::record_fanout_duration(
            if result.is_ok() { "success" } else { "failure" },
            start.elapsed(),
        );

        result
    }

    async fn fetch(&self, parent: &SpanGuard, url: &str) -> Result<String, FanoutError> {
        let mut span = parent.child("fanout.fetch", SpanKind::Client);
        span.set_attribute(SpanAttribute::TargetUrl(url.to_string()));

        let result = self.fetch_body(&mut span, url).await;

        match &result {
            Ok(body) => {
                tracing::debug!(target_url = %url, bytes = body.len(), "Fan-out target succeeded");
                metrics::record_target(url, "success");
            }
            Err(e) => {
                tracing::warn!(target_url = %url, error = %e, "Fan-out target failed");
                metrics::record_target(url, e.outcome());
            }
        }

        span.finish(&result);
        result
    }

    async fn fetch_body(&self, span: &mut SpanGuard, url: &str) -> Result<String, FanoutError> {
        let response = self
            .client
            .get(url)
            .headers(propagation::inject(span.context()))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|source| FanoutError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        span.set_attribute(SpanAttribute::HttpStatus(status.as_u16()));

        // `response` is dropped on every early return, releasing the connection
        if !status.is_success() {
            return Err(FanoutError::UpstreamStatus {
                url: url.to_string(),
                status,
            });
        }

        response.text().await.map_err(|source| FanoutError::BodyRead {
            url: url.to_string(),
            source,
        })
    }
}
