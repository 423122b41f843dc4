//! Scheduler client contract
//!
//! Only `DeleteJob` and `GetJob` are used. "Not found" is a distinct
//! error so callers can tell a confirmed absence from a failed lookup.

pub mod cloud;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::observability::TraceContext;

pub use cloud::CloudSchedulerClient;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("scheduler API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("scheduler request failed: {0}")]
    Transport(String),

    #[error("could not obtain scheduler credentials: {0}")]
    Auth(String),
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound(_))
    }
}

impl From<reqwest::Error> for SchedulerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait SchedulerClient: Send + Sync {
    async fn delete_job(&self, name: &str, trace: &TraceContext) -> Result<(), SchedulerError>;

    async fn get_job(&self, name: &str, trace: &TraceContext) -> Result<Job, SchedulerError>;
}

/// Check that `name` has the shape `projects/{p}/locations/{l}/jobs/{j}`
pub fn validate_job_name(name: &str) -> Result<(), String> {
    let segments: Vec<&str> = name.split('/').collect();
    let valid = segments.len() == 6
        && segments[0] == "projects"
        && segments[2] == "locations"
        && segments[4] == "jobs"
        && [segments[1], segments[3], segments[5]]
            .iter()
            .all(|s| is_safe_segment(s));

    if valid {
        Ok(())
    } else {
        Err(format!(
            "expected projects/PROJECT_ID/locations/LOCATION_ID/jobs/JOB_ID, got '{}'",
            name
        ))
    }
}

/// Anything the REST path can carry verbatim; domain-scoped projects
/// (`example.com:my-proj`) included
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#' | '%'))
}
