use axum::{
    extract::{rejection::FormRejection, rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};

use crate::{error::AppError, metrics, observability::propagation};

use super::{form_value, AppState, FormPairs};

/// Handle GET/POST /hello
pub async fn handle_hello(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<FormPairs>, QueryRejection>,
    form: Result<Form<FormPairs>, FormRejection>,
) -> Result<Response, AppError> {
    let message = form_value(
        form.as_ref().ok().map(|Form(p)| p),
        query.as_ref().ok().map(|Query(p)| p),
        "message",
    );
    let parent = propagation::extract(&headers);

    let result = state.gateway.handle(parent.as_ref(), message).await;
    metrics::record_request(
        "/hello",
        match &result {
            Ok(_) => StatusCode::OK.as_u16(),
            Err(e) => e.status().as_u16(),
        },
    );

    let body = serde_json::to_string(&result?)
        .map_err(|e| AppError::Internal(format!("Failed to encode response: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response())
}
