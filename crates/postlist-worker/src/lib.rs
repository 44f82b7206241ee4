//! Post ingestion worker.
//!
//! This crate provides:
//! - The orchestrator: request start, cached replay, polling and cancellation
//! - The per-request stage pipeline with ordered progress events
//! - Production collaborators (yt-dlp, ML classifier, transcription, Gemini)
//! - The background cache sweeper

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod content;
pub mod downloader;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod sweeper;
pub mod transcript;

pub use classifier::MlClassifier;
pub use collaborators::{
    ClassifierOracle, Collaborators, ContentGenerator, DownloadedPost, Downloader,
    FfmpegFrameExtractor, FrameExtractor, GenerationInput, Transcriber,
};
pub use config::WorkerConfig;
pub use downloader::YtDlpDownloader;
pub use error::{StageFailure, StageOutcome, WorkerError, WorkerResult};
pub use gemini::{GeminiConfig, GeminiGenerator};
pub use logging::RequestLogger;
pub use orchestrator::{Orchestrator, StartHandle};
pub use pipeline::{Pipeline, RequestContext, RunOutcome};
pub use progress::{EventSink, ProgressHub};
pub use session::{CancelToken, SessionRegistry};
pub use sweeper::CacheSweeper;
pub use transcript::{HttpTranscriber, TranscribeConfig};
