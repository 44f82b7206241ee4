//! Progress events delivered to the client that started a request.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::listing::ResultDocument;
use crate::stage::ProcessingStage;

/// Event envelope, tagged with `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Entered a new stage
    Progress {
        stage: ProcessingStage,
        label: String,
        /// Percentage (0-100)
        value: u8,
    },

    /// Final result, fresh or replayed from cache
    Result { document: ResultDocument },

    /// Fatal failure
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Create a progress event for entering `stage`.
    pub fn progress(stage: ProcessingStage) -> Self {
        ProgressEvent::Progress {
            stage,
            label: stage.label().to_string(),
            value: stage.progress().min(100),
        }
    }

    /// Create a result event.
    pub fn result(document: ResultDocument) -> Self {
        ProgressEvent::Result { document }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether no further events follow this one.
    pub fn is_final(&self) -> bool {
        matches!(self, ProgressEvent::Result { .. } | ProgressEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = ProgressEvent::progress(ProcessingStage::Downloading);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "downloading");
        assert_eq!(json["value"], 20);
        assert!(!event.is_final());
    }

    #[test]
    fn test_error_event_is_final() {
        let event = ProgressEvent::error("download failed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "download failed");
        assert!(event.is_final());
    }
}
