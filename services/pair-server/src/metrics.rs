//! Prometheus metrics exposition
//!
//! - `pairing_attempts_total` (counter): label `outcome`
//! - `pairing_retries_total` (counter)
//! - `pairing_code_request_duration_seconds` (histogram): label `status`
//! - `pairing_uploads_total` (counter): label `status`
//! - `pairing_cleanups_total` (counter): temp stores removed

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const CODE_REQUEST_HISTOGRAM: &str = "pairing_code_request_duration_seconds";

/// Code requests include the readiness delay, so buckets start at 100ms.
const CODE_REQUEST_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 30.0, 60.0];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(CODE_REQUEST_HISTOGRAM.to_string()),
            CODE_REQUEST_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record how an attempt ended (`succeeded`, `auth_failed`, ...).
pub fn record_attempt(outcome: &'static str) {
    metrics::counter!("pairing_attempts_total", "outcome" => outcome).increment(1);
}

/// Record one reconnect after a transient close.
pub fn record_retry() {
    metrics::counter!("pairing_retries_total").increment(1);
}

/// Record a pairing code request and its duration.
pub fn record_code_request(ok: bool, duration_secs: f64) {
    let status = if ok { "ok" } else { "error" };
    metrics::histogram!(CODE_REQUEST_HISTOGRAM, "status" => status).record(duration_secs);
}

/// Record an upload result (`ok` or an `UploadError` label).
pub fn record_upload(status: &'static str) {
    metrics::counter!("pairing_uploads_total", "status" => status).increment(1);
}

/// Record removal of an attempt's temp store.
pub fn record_cleanup() {
    metrics::counter!("pairing_cleanups_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_attempt("succeeded");
        record_retry();
        record_code_request(true, 1.6);
        record_upload("ok");
        record_cleanup();
    }

    /// Isolated recorder/handle pair; `install_recorder()` can only run
    /// once per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn attempt_outcomes_render_with_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_attempt("succeeded");
        record_attempt("auth_failed");
        record_retry();
        record_retry();

        let output = handle.render();
        assert!(output.contains("pairing_attempts_total"));
        assert!(output.contains("outcome=\"succeeded\""));
        assert!(output.contains("outcome=\"auth_failed\""));
        assert!(
            output.contains("pairing_retries_total 2"),
            "retry counter must be 2, got:\n{output}"
        );
    }

    #[test]
    fn code_request_histogram_uses_buckets() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_code_request(true, 1.7);
        record_code_request(false, 0.05);

        let output = handle.render();
        assert!(output.contains("pairing_code_request_duration_seconds_bucket"));
        assert!(output.contains("le=\"0.1\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("status=\"error\""));
    }

    #[test]
    fn upload_counter_carries_status() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upload("ok");
        record_upload("rejected");

        let output = handle.render();
        assert!(output.contains("pairing_uploads_total"));
        assert!(output.contains("status=\"rejected\""));
    }
}
