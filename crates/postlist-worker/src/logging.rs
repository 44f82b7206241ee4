//! Structured request logging utilities.
//!
//! Gives every log line of a request the same `request_id` / `source`
//! fields so one run can be followed through the pipeline.

use tracing::{error, info, warn, Span};

use postlist_models::{ProcessingStage, RequestId, SourceKey};

/// Request logger for structured lifecycle logging.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: String,
    source: String,
}

impl RequestLogger {
    pub fn new(request_id: &RequestId, source: &SourceKey) -> Self {
        Self {
            request_id: request_id.to_string(),
            source: source.to_string(),
        }
    }

    /// Log the start of a request.
    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            source = %self.source,
            "Request started: {}", message
        );
    }

    /// Log entry into a stage.
    pub fn log_stage(&self, stage: ProcessingStage) {
        info!(
            request_id = %self.request_id,
            source = %self.source,
            stage = %stage,
            progress = stage.progress(),
            "Request stage: {}", stage.label()
        );
    }

    /// Log a degraded stage or other non-fatal problem.
    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            source = %self.source,
            "Request warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            request_id = %self.request_id,
            source = %self.source,
            "Request error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            source = %self.source,
            "Request completed: {}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Span wrapping the whole pipeline run of this request.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            source = %self.source
        )
    }
}
