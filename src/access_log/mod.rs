//! Durable access log
//!
//! Every `/hello` request is recorded here before any downstream call is
//! made. The id is generated by the gateway, never by the store.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use sqlite::SqliteAccessLogStore;

/// One inbound request, as recorded before fan-out
#[derive(Debug, Clone, PartialEq)]
pub struct AccessLogEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message: Option<String>,
    pub trace_id: Option<String>,
}

/// Fresh globally unique entry id (UUID v4)
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl AccessLogEntry {
    pub fn new(id: String, message: Option<String>, trace_id: Option<String>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            message,
            trace_id,
        }
    }
}

/// Any access-log write failure; always fatal to the request
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("access log backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait AccessLogStore: Send + Sync {
    /// Durably record `entry`, returning its key (the entry id).
    /// On error nothing is visible.
    async fn insert(&self, entry: &AccessLogEntry) -> Result<String, StoreError>;
}
