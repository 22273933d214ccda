use std::sync::OnceLock;
use std::time::Duration;

use agora_domain::engagement::{TargetType, ToggleOutcome};
use anyhow::Result;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "agora_api_http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "agora_api_http_request_duration_seconds";
const HTTP_REQUEST_ERRORS_TOTAL: &str = "agora_api_http_errors_total";
const LIKE_TOGGLES_TOTAL: &str = "agora_api_like_toggles_total";
const IDEMPOTENT_REPLAYS_TOTAL: &str = "agora_api_idempotent_replays_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_http_request(method: &str, route: &str, status: StatusCode, elapsed: Duration) {
    let status_code = status.as_u16().to_string();
    let result = if status.is_server_error() {
        "error"
    } else {
        "success"
    };

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone(),
        "result" => result
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone()
    )
    .record(elapsed.as_secs_f64());

    if status.is_server_error() {
        counter!(
            HTTP_REQUEST_ERRORS_TOTAL,
            "method" => method.to_string(),
            "route" => route.to_string(),
            "status" => status_code
        )
        .increment(1);
    }
}

/// `already_*` outcomes are the lost races.
pub fn register_like_toggle(target_type: TargetType, outcome: ToggleOutcome) {
    counter!(
        LIKE_TOGGLES_TOTAL,
        "target_type" => target_type.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn register_idempotent_replay(operation: &'static str) {
    counter!(IDEMPOTENT_REPLAYS_TOTAL, "operation" => operation).increment(1);
}
