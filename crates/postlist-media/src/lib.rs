//! Media handling for the postlist pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeouts
//! - FFprobe frame-count probing
//! - Frame sampling and spacing-aware frame selection
//! - Post download via yt-dlp with an explicit cookie session
//! - Speech audio extraction and inline JPEG preparation

pub mod audio;
pub mod command;
pub mod download;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod jpeg;
pub mod probe;

pub use audio::extract_speech_audio;
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{
    download_image, download_post_video, fetch_post_metadata, parse_post_metadata, CookieSession,
    MediaItem, PostMetadata,
};
pub use error::{MediaError, MediaResult};
pub use frames::{
    sample_frames, sampling_interval, select_frames, SampledFrame, SamplerConfig, Selection,
    SelectorConfig,
};
pub use jpeg::encode_bounded_jpeg;
pub use probe::{probe_video, VideoInfo};
