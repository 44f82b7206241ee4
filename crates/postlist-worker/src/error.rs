//! Worker error types and the stage failure taxonomy.

use postlist_models::ProcessingStage;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid source: {0}")]
    InvalidSource(#[from] postlist_models::SourceKeyError),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Content generation failed: {0}")]
    GenerationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] postlist_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] postlist_media::MediaError),

    #[error("Classifier error: {0}")]
    Ml(#[from] postlist_ml_client::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn classification_failed(msg: impl Into<String>) -> Self {
        Self::ClassificationFailed(msg.into())
    }

    pub fn transcription_failed(msg: impl Into<String>) -> Self {
        Self::TranscriptionFailed(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// How a failure inside a stage affects the request.
#[derive(Debug)]
pub enum StageFailure {
    /// Abort the request, delete its artifacts and report the error.
    Fatal(WorkerError),
    /// Degrade in place and keep going.
    Recoverable(WorkerError),
    /// A required artifact was missing and has been recreated.
    Resource(String),
    /// The request was canceled; not an error.
    Cancellation,
}

impl StageFailure {
    /// Classify an error raised while running `stage`.
    ///
    /// Downloading and persisting the result are the only stages whose
    /// failure ends the request.
    pub fn classify(stage: ProcessingStage, error: WorkerError) -> Self {
        match stage {
            ProcessingStage::ExtractingFrames
            | ProcessingStage::ClassifyingFrames
            | ProcessingStage::Transcribing
            | ProcessingStage::GeneratingContent => Self::Recoverable(error),
            _ => Self::Fatal(error),
        }
    }

    pub fn into_outcome(self) -> StageOutcome {
        match self {
            Self::Fatal(e) => StageOutcome::Fatal(e),
            Self::Recoverable(e) => StageOutcome::Degraded(e.to_string()),
            Self::Resource(reason) => StageOutcome::Degraded(reason),
            Self::Cancellation => StageOutcome::Canceled,
        }
    }
}

/// Result of running one stage.
#[derive(Debug)]
pub enum StageOutcome {
    Completed,
    /// Finished with a fallback in place of the real output
    Degraded(String),
    Fatal(WorkerError),
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_failure_is_fatal() {
        let failure = StageFailure::classify(
            ProcessingStage::Downloading,
            WorkerError::download_failed("private post"),
        );
        assert!(matches!(failure.into_outcome(), StageOutcome::Fatal(_)));
    }

    #[test]
    fn test_generation_failure_degrades() {
        let failure = StageFailure::classify(
            ProcessingStage::GeneratingContent,
            WorkerError::generation_failed("quota"),
        );
        match failure.into_outcome() {
            StageOutcome::Degraded(reason) => assert!(reason.contains("quota")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_finalizing_failure_is_fatal() {
        let failure = StageFailure::classify(
            ProcessingStage::Finalizing,
            WorkerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
        );
        assert!(matches!(failure, StageFailure::Fatal(_)));
    }

    #[test]
    fn test_resource_and_cancellation() {
        assert!(matches!(
            StageFailure::Resource("caption recreated".into()).into_outcome(),
            StageOutcome::Degraded(_)
        ));
        assert!(matches!(
            StageFailure::Cancellation.into_outcome(),
            StageOutcome::Canceled
        ));
    }
}
