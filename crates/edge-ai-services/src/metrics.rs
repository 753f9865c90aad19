// edge-ai-services/src/metrics.rs

use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::OnceLock;
use tracing::error;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static INFERENCE_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static IN_FLIGHT: OnceLock<IntGauge> = OnceLock::new();

/// Register the collectors. Safe to call more than once.
pub fn init_metrics() {
    if let Ok(counter) = IntCounterVec::new(
        prometheus::opts!("requests_total", "Total requests per route"),
        &["route", "status"],
    ) {
        let counter = REQ_COUNTER.get_or_init(|| counter);
        REGISTRY.register(Box::new(counter.clone())).ok();
    }

    if let Ok(histogram) = HistogramVec::new(
        HistogramOpts::new("inference_duration_seconds", "Model call duration per route")
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["route"],
    ) {
        let histogram = INFERENCE_SECONDS.get_or_init(|| histogram);
        REGISTRY.register(Box::new(histogram.clone())).ok();
    }

    if let Ok(gauge) = IntGauge::new("inference_in_flight", "Model calls currently running") {
        let gauge = IN_FLIGHT.get_or_init(|| gauge);
        REGISTRY.register(Box::new(gauge.clone())).ok();
    }
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn observe_inference(route: &str, seconds: f64) {
    if let Some(histogram) = INFERENCE_SECONDS.get() {
        histogram.with_label_values(&[route]).observe(seconds);
    }
}

pub fn inc_in_flight() {
    if let Some(gauge) = IN_FLIGHT.get() {
        gauge.inc();
    }
}

pub fn dec_in_flight() {
    if let Some(gauge) = IN_FLIGHT.get() {
        gauge.dec();
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            b"failed to encode metrics".to_vec(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
