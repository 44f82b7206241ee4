//! Request status snapshots for polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::listing::ResultDocument;
use crate::request::RequestId;
use crate::source::SourceKey;
use crate::stage::ProcessingStage;

/// Snapshot of one request's state.
///
/// Updated by the orchestrator only; readers get clones through a watch
/// channel or a poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatus {
    pub request_id: RequestId,
    pub source: SourceKey,
    pub stage: ProcessingStage,
    /// Progress percentage (0-100), never decreases
    pub progress: u8,
    /// Current stage description
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sequence number for event ordering (monotonically increasing)
    pub event_seq: u64,
}

impl RequestStatus {
    /// Create a status entry in the `Initializing` stage.
    pub fn new(request_id: RequestId, source: SourceKey) -> Self {
        let now = Utc::now();
        let stage = ProcessingStage::Initializing;
        Self {
            request_id,
            source,
            stage,
            progress: stage.progress(),
            label: stage.label().to_string(),
            result: None,
            error_message: None,
            started_at: now,
            updated_at: now,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Enter a stage. Progress is clamped so it never moves backwards.
    pub fn enter_stage(&mut self, stage: ProcessingStage) {
        self.stage = stage;
        self.label = stage.label().to_string();
        self.progress = self.progress.max(stage.progress()).min(100);
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Mark the request as completed with its result.
    pub fn complete(&mut self, result: ResultDocument) {
        self.enter_stage(ProcessingStage::Completed);
        self.result = Some(result);
    }

    /// Mark the request as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.stage = ProcessingStage::Failed;
        self.label = ProcessingStage::Failed.label().to_string();
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Mark the request as canceled. No result or error is recorded.
    pub fn cancel(&mut self) {
        self.stage = ProcessingStage::Canceled;
        self.label = ProcessingStage::Canceled.label().to_string();
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }
}
