use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{access_log::StoreError, fanout::FanoutError, scheduler::SchedulerError};

/// Application error types surfaced at the HTTP boundary
#[derive(Debug, Error)]
pub enum AppError {
    /// Access-log write failed; the request never reached downstream services
    #[error("Access log error: {0}")]
    Store(#[from] StoreError),

    /// A fan-out target failed (transport, status or body)
    #[error("Fan-out error: {0}")]
    Fanout(#[from] FanoutError),

    /// The scheduler rejected or failed the delete call
    #[error("Scheduler delete error: {0}")]
    SchedulerDelete(SchedulerError),

    /// The request did not carry a usable job name
    #[error("Invalid job name: {0}")]
    InvalidJobName(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidJobName(_) => StatusCode::BAD_REQUEST,
            Self::Store(_)
            | Self::Fanout(_)
            | Self::SchedulerDelete(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Details stay in the logs; clients only get the kind.
        tracing::error!(
            error = %self,
            error_type = error_type_name(&self),
            status = status.as_u16(),
            "Request failed"
        );

        let body = Json(json!({
            "error": {
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

pub(crate) fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Store(_) => "store_error",
        AppError::Fanout(FanoutError::Network { .. }) => "network_error",
        AppError::Fanout(FanoutError::UpstreamStatus { .. }) => "upstream_status_error",
        AppError::Fanout(FanoutError::BodyRead { .. }) => "body_read_error",
        AppError::Fanout(FanoutError::DeadlineExceeded(_)) => "deadline_exceeded",
        AppError::SchedulerDelete(_) => "scheduler_delete_error",
        AppError::InvalidJobName(_) => "invalid_job_name",
        AppError::Internal(_) => "internal_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::InvalidJobName("jobs/x".to_string());
        assert_eq!(error.to_string(), "Invalid job name: jobs/x");
    }

    #[test]
    fn test_error_type_name() {
        assert_eq!(
            error_type_name(&AppError::Store(StoreError::Backend("disk full".to_string()))),
            "store_error"
        );
        assert_eq!(
            error_type_name(&AppError::Fanout(FanoutError::UpstreamStatus {
                url: "http://a".to_string(),
                status: StatusCode::BAD_GATEWAY,
            })),
            "upstream_status_error"
        );
    }

    #[tokio::test]
    async fn test_error_response_statuses() {
        let response = AppError::InvalidJobName("".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            AppError::Store(StoreError::Backend("unavailable".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::SchedulerDelete(SchedulerError::Api {
            status: StatusCode::FORBIDDEN,
            message: "denied".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
