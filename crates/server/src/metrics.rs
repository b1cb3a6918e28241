//! Prometheus metrics

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use nmt_core::LanguagePair;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

const TRANSLATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];
const MODEL_LOAD_BUCKETS: &[f64] = &[0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0];

/// Install the global Prometheus recorder
///
/// Safe to call more than once; later calls return the installed handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PROMETHEUS
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .set_buckets_for_metric(
                    Matcher::Full("nmt_translation_duration_seconds".to_string()),
                    TRANSLATION_BUCKETS,
                )?
                .set_buckets_for_metric(
                    Matcher::Full("nmt_model_load_duration_seconds".to_string()),
                    MODEL_LOAD_BUCKETS,
                )?
                .install_recorder()
        })
        .cloned()
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Record a finished translation request
pub fn record_translation(pair: LanguagePair, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(
        "nmt_translations_total",
        "pair" => pair.slug(),
        "outcome" => outcome
    )
    .increment(1);
    if outcome == "success" {
        metrics::histogram!("nmt_translation_duration_seconds", "pair" => pair.slug())
            .record(elapsed.as_secs_f64());
    }
}

pub fn record_validation_rejection() {
    metrics::counter!("nmt_validation_rejections_total").increment(1);
}

pub fn record_model_load(success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("nmt_model_loads_total", "outcome" => outcome).increment(1);
    metrics::histogram!("nmt_model_load_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("nmt_active_sessions").set(count as f64);
}
