//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use postlist_models::ProcessingStage;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Request lifecycle
    pub const REQUESTS_STARTED_TOTAL: &str = "postlist_requests_started_total";
    pub const REQUESTS_COMPLETED_TOTAL: &str = "postlist_requests_completed_total";
    pub const REQUESTS_FAILED_TOTAL: &str = "postlist_requests_failed_total";
    pub const REQUESTS_CANCELED_TOTAL: &str = "postlist_requests_canceled_total";
    pub const REQUESTS_IN_FLIGHT: &str = "postlist_requests_in_flight";

    // Cache
    pub const CACHE_HITS_TOTAL: &str = "postlist_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "postlist_cache_misses_total";
    pub const SWEEP_DELETIONS_TOTAL: &str = "postlist_sweep_deletions_total";

    // Stages
    pub const STAGE_DURATION_SECONDS: &str = "postlist_stage_duration_seconds";
    pub const STAGES_DEGRADED_TOTAL: &str = "postlist_stages_degraded_total";

    // Frames
    pub const FRAMES_SAMPLED_TOTAL: &str = "postlist_frames_sampled_total";
    pub const FRAMES_SELECTED_TOTAL: &str = "postlist_frames_selected_total";
    pub const FRAMES_UNSCORED_TOTAL: &str = "postlist_frames_unscored_total";
}

pub fn record_request_started() {
    counter!(names::REQUESTS_STARTED_TOTAL).increment(1);
    gauge!(names::REQUESTS_IN_FLIGHT).increment(1.0);
}

pub fn record_request_completed() {
    counter!(names::REQUESTS_COMPLETED_TOTAL).increment(1);
    gauge!(names::REQUESTS_IN_FLIGHT).decrement(1.0);
}

/// Record a fatal failure, labelled with the stage it happened in.
pub fn record_request_failed(stage: ProcessingStage) {
    let labels = [("stage", stage.as_str().to_string())];
    counter!(names::REQUESTS_FAILED_TOTAL, &labels).increment(1);
    gauge!(names::REQUESTS_IN_FLIGHT).decrement(1.0);
}

pub fn record_request_canceled() {
    counter!(names::REQUESTS_CANCELED_TOTAL).increment(1);
    gauge!(names::REQUESTS_IN_FLIGHT).decrement(1.0);
}

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_sweep_deletions(count: usize) {
    counter!(names::SWEEP_DELETIONS_TOTAL).increment(count as u64);
}

/// Record how long a stage ran.
pub fn record_stage_duration(stage: ProcessingStage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_stage_degraded(stage: ProcessingStage) {
    let labels = [("stage", stage.as_str().to_string())];
    counter!(names::STAGES_DEGRADED_TOTAL, &labels).increment(1);
}

/// Record frame counts of one classification pass.
pub fn record_frames(sampled: usize, selected: usize, unscored: usize) {
    counter!(names::FRAMES_SAMPLED_TOTAL).increment(sampled as u64);
    counter!(names::FRAMES_SELECTED_TOTAL).increment(selected as u64);
    counter!(names::FRAMES_UNSCORED_TOTAL).increment(unscored as u64);
}
