//! Classifier service request/response types.

use serde::{Deserialize, Serialize};

/// Response from `POST /classify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    /// Relevance of the image in [0, 1]
    pub score: f32,
    /// Predicted class label, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
