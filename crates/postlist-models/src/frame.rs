//! Sampled video frames.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A candidate frame sampled from a video.
///
/// `index` is the frame's position in the source timeline, not its
/// position in the sampled sequence; spacing between selected frames is
/// measured over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Source timeline index
    pub index: u64,
    /// Relevance score in [0, 1]
    pub score: f32,
    /// Whether the selector kept this frame
    #[serde(default)]
    pub selected: bool,
    /// Image file of the sampled frame
    pub path: PathBuf,
}

impl Frame {
    /// Create a scored frame.
    ///
    /// Returns `None` when the score is not a finite value in [0, 1].
    pub fn scored(index: u64, score: f32, path: impl Into<PathBuf>) -> Option<Self> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return None;
        }

        Some(Self {
            index,
            score,
            selected: false,
            path: path.into(),
        })
    }

    /// Absolute timeline distance to another frame.
    pub fn distance(&self, other: &Frame) -> u64 {
        self.index.abs_diff(other.index)
    }
}
