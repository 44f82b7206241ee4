//! Processing stages of a single request.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stage of the per-request pipeline.
///
/// Video-only stages (`ExtractingFrames`, `ClassifyingFrames`,
/// `Transcribing`) are skipped for image posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    #[default]
    Initializing,
    Downloading,
    ExtractingFrames,
    ClassifyingFrames,
    Transcribing,
    GeneratingContent,
    Finalizing,
    Completed,
    Failed,
    Canceled,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Initializing => "initializing",
            ProcessingStage::Downloading => "downloading",
            ProcessingStage::ExtractingFrames => "extracting_frames",
            ProcessingStage::ClassifyingFrames => "classifying_frames",
            ProcessingStage::Transcribing => "transcribing",
            ProcessingStage::GeneratingContent => "generating_content",
            ProcessingStage::Finalizing => "finalizing",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
            ProcessingStage::Canceled => "canceled",
        }
    }

    /// Fixed progress percentage reported on entry to this stage.
    ///
    /// Strictly increasing along every path through the pipeline.
    pub fn progress(&self) -> u8 {
        match self {
            ProcessingStage::Initializing => 0,
            ProcessingStage::Downloading => 20,
            ProcessingStage::ExtractingFrames => 40,
            ProcessingStage::ClassifyingFrames => 60,
            ProcessingStage::Transcribing => 80,
            ProcessingStage::GeneratingContent => 95,
            ProcessingStage::Finalizing => 98,
            ProcessingStage::Completed => 100,
            // Terminal failures keep whatever progress was reached.
            ProcessingStage::Failed | ProcessingStage::Canceled => 0,
        }
    }

    /// Human readable label shown to clients.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingStage::Initializing => "Preparing request...",
            ProcessingStage::Downloading => "Downloading media and caption...",
            ProcessingStage::ExtractingFrames => "Separating frames from video...",
            ProcessingStage::ClassifyingFrames => {
                "Classifying frames and selecting the best ones..."
            }
            ProcessingStage::Transcribing => "Extracting and transcribing audio...",
            ProcessingStage::GeneratingContent => "Generating final listing with AI...",
            ProcessingStage::Finalizing => "Saving results...",
            ProcessingStage::Completed => "Done",
            ProcessingStage::Failed => "Failed",
            ProcessingStage::Canceled => "Canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Completed | ProcessingStage::Failed | ProcessingStage::Canceled
        )
    }

    /// Whether this stage only runs for video sources.
    pub fn is_video_only(&self) -> bool {
        matches!(
            self,
            ProcessingStage::ExtractingFrames
                | ProcessingStage::ClassifyingFrames
                | ProcessingStage::Transcribing
        )
    }

    /// The stage that follows this one on the success path.
    ///
    /// Returns `None` after `Finalizing` and for terminal stages.
    pub fn next(&self, is_video: bool) -> Option<ProcessingStage> {
        let next = match self {
            ProcessingStage::Initializing => ProcessingStage::Downloading,
            ProcessingStage::Downloading if is_video => ProcessingStage::ExtractingFrames,
            ProcessingStage::Downloading => ProcessingStage::GeneratingContent,
            ProcessingStage::ExtractingFrames => ProcessingStage::ClassifyingFrames,
            ProcessingStage::ClassifyingFrames => ProcessingStage::Transcribing,
            ProcessingStage::Transcribing => ProcessingStage::GeneratingContent,
            ProcessingStage::GeneratingContent => ProcessingStage::Finalizing,
            ProcessingStage::Finalizing
            | ProcessingStage::Completed
            | ProcessingStage::Failed
            | ProcessingStage::Canceled => return None,
        };
        Some(next)
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
