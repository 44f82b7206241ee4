//! External collaborators of the pipeline.
//!
//! Every side effect outside the request directory goes through one of these
//! traits so the orchestrator can run against fakes in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use postlist_media::{sample_frames, SampledFrame, SamplerConfig};
use postlist_models::{Listing, SourceKey};
use postlist_storage::RequestDir;

use crate::error::WorkerResult;

/// What the downloader left in the request directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedPost {
    pub is_video: bool,
    pub video_path: Option<PathBuf>,
    /// Still images of an image post, in post order
    pub images: Vec<PathBuf>,
    pub caption_path: PathBuf,
}

/// Inputs for listing generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub source: &'a SourceKey,
    pub caption: &'a str,
    pub transcript: &'a str,
    /// Final images, in rank order
    pub images: &'a [PathBuf],
}

/// Fetches a post's media and caption into the request directory.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Writes `caption.txt` and either `video.mp4` or the post's images.
    async fn download(&self, source: &SourceKey, dir: &RequestDir) -> WorkerResult<DownloadedPost>;
}

/// Writes candidate frames of a video to disk.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Never fails; an unreadable video yields no frames.
    async fn extract(&self, video: &Path, frames_dir: &Path) -> Vec<SampledFrame>;
}

/// Scores a frame's relevance in [0, 1].
#[async_trait]
pub trait ClassifierOracle: Send + Sync {
    async fn score(&self, frame: &Path) -> WorkerResult<f32>;
}

/// Turns a video's speech into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, video: &Path, dir: &RequestDir) -> WorkerResult<String>;
}

/// Produces the structured listing.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, input: GenerationInput<'_>) -> WorkerResult<Listing>;
}

/// The full set of collaborators a pipeline runs with.
#[derive(Clone)]
pub struct Collaborators {
    pub downloader: Arc<dyn Downloader>,
    pub extractor: Arc<dyn FrameExtractor>,
    pub classifier: Arc<dyn ClassifierOracle>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn ContentGenerator>,
}

/// FFmpeg-backed frame extraction.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameExtractor {
    config: SamplerConfig,
}

impl FfmpegFrameExtractor {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, video: &Path, frames_dir: &Path) -> Vec<SampledFrame> {
        sample_frames(video, frames_dir, &self.config).await
    }
}
