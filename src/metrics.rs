// ABOUTME: Prometheus metrics registration for the orchestration core.
// ABOUTME: Installs the recorder and describes every counter the crates emit.

use anyhow::{Context, Result};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the counters emitted across
/// the workspace. Returns the handle the /metrics endpoint renders from.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(
        "meshline_threads_created_total",
        "Transport threads created through the ensure-thread funnel"
    );
    describe_counter!(
        "meshline_tokens_issued_total",
        "Chat-scoped access tokens issued"
    );
    describe_counter!(
        "meshline_assistant_messages_total",
        "Assistant replies delivered to transport threads"
    );
    describe_counter!(
        "meshline_http_errors_total",
        "Error responses emitted by the HTTP surface"
    );

    Ok(handle)
}

pub fn counter_http_error() {
    metrics::counter!("meshline_http_errors_total").increment(1);
}
