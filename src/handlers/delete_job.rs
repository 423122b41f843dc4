use axum::{
    extract::{rejection::FormRejection, rejection::QueryRejection, Query, State},
    http::{HeaderMap, StatusCode},
    Form,
};

use crate::{error::AppError, metrics, observability::propagation};

use super::{form_value, AppState, FormPairs};

/// Handle GET/POST /deleteSchedulerJob
///
/// 200 once the delete call succeeded (confirmed or not), 500 when it failed.
pub async fn handle_delete_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<FormPairs>, QueryRejection>,
    form: Result<Form<FormPairs>, FormRejection>,
) -> Result<StatusCode, AppError> {
    let job_name = form_value(
        form.as_ref().ok().map(|Form(p)| p),
        query.as_ref().ok().map(|Query(p)| p),
        "jobName",
    )
    .unwrap_or_default();
    let parent = propagation::extract(&headers);

    let result = state.deletion.run(parent.as_ref(), &job_name).await;
    metrics::record_request(
        "/deleteSchedulerJob",
        match &result {
            Ok(_) => StatusCode::OK.as_u16(),
            Err(e) => e.status().as_u16(),
        },
    );

    let outcome = result?;
    tracing::info!(
        job_name = %job_name,
        state = outcome.state.as_str(),
        "Scheduler job delete handled"
    );

    Ok(StatusCode::OK)
}
