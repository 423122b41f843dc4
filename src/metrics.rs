use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and describe all metrics
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "gateway_requests_total",
        "Total number of inbound requests by endpoint and status"
    );
    describe_counter!(
        "fanout_target_requests_total",
        "Outbound fan-out calls by target and outcome"
    );
    describe_histogram!(
        "fanout_duration_seconds",
        "Wall time of a whole fan-out, all targets included"
    );
    describe_counter!(
        "job_deletions_total",
        "Scheduler job deletions by final workflow state"
    );
    describe_gauge!("gateway_info", "Gateway version information");

    gauge!("gateway_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record an inbound request
pub fn record_request(endpoint: &str, status: u16) {
    counter!(
        "gateway_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record one fan-out call
pub fn record_target(target: &str, outcome: &str) {
    counter!(
        "fanout_target_requests_total",
        "target" => target.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

pub fn record_fanout_duration(outcome: &str, duration: Duration) {
    histogram!(
        "fanout_duration_seconds",
        "outcome" => outcome.to_string(),
    )
    .record(duration.as_secs_f64());
}

pub fn record_deletion(state: &str) {
    counter!("job_deletions_total", "state" => state.to_string()).increment(1);
}
