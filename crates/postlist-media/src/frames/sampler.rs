//! Frame sampler.
//!
//! Extracts every K-th frame of a video with FFmpeg, where K is chosen so
//! that roughly `target_candidates` images come out. Output files are named
//! after their index in the source timeline (`frame_000120.jpg`), which is
//! what the selector's spacing rule is measured on.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{list_files_sorted, move_file};
use crate::probe::probe_video;

/// Prefix of the raw FFmpeg image sequence before renaming.
const RAW_PREFIX: &str = "raw_";

/// Sampling parameters.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Approximate number of frames to extract
    pub target_candidates: u64,
    /// Interval used when the frame count cannot be determined
    pub fallback_interval: u64,
    /// Upper bound on the FFmpeg run
    pub timeout_secs: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_candidates: 300,
            fallback_interval: 10,
            timeout_secs: 600,
        }
    }
}

/// A frame written to disk by the sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledFrame {
    /// Source timeline index
    pub index: u64,
    pub path: PathBuf,
}

/// Sampling interval for a video with `total_frames` frames.
pub fn sampling_interval(total_frames: Option<u64>, config: &SamplerConfig) -> u64 {
    match total_frames {
        Some(total) if total > 0 => (total / config.target_candidates.max(1)).max(1),
        _ => config.fallback_interval.max(1),
    }
}

/// File name for the frame at source index `index`.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.jpg", index)
}

/// Sample candidate frames from `video` into `output_dir`.
///
/// Never fails: an unreadable or corrupt video yields an empty list and a
/// warning, and the caller continues with zero frames.
pub async fn sample_frames(
    video: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &SamplerConfig,
) -> Vec<SampledFrame> {
    let video = video.as_ref();
    match try_sample_frames(video, output_dir.as_ref(), config).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(video = %video.display(), error = %e, "Frame sampling failed, continuing without frames");
            Vec::new()
        }
    }
}

/// Sample candidate frames, surfacing failures.
pub async fn try_sample_frames(
    video: &Path,
    output_dir: &Path,
    config: &SamplerConfig,
) -> MediaResult<Vec<SampledFrame>> {
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    tokio::fs::create_dir_all(output_dir).await?;

    let total_frames = match probe_video(video).await {
        Ok(info) => info.total_frames(),
        Err(e) => {
            debug!(error = %e, "Could not probe frame count, using fallback interval");
            None
        }
    };
    let interval = sampling_interval(total_frames, config);

    info!(
        video = %video.display(),
        total_frames = ?total_frames,
        interval = interval,
        "Sampling frames"
    );

    let pattern = output_dir.join(format!("{}%06d.jpg", RAW_PREFIX));
    let cmd = FfmpegCommand::new(video, &pattern)
        .video_filter(format!("select=not(mod(n\\,{}))", interval))
        .variable_frame_rate()
        .jpeg_quality(2);

    FfmpegRunner::new()
        .with_timeout(config.timeout_secs)
        .run(&cmd)
        .await?;

    rename_raw_frames(output_dir, interval).await
}

/// Rename the j-th (1-based) raw image to its source index `(j - 1) * interval`.
async fn rename_raw_frames(output_dir: &Path, interval: u64) -> MediaResult<Vec<SampledFrame>> {
    let raw: Vec<PathBuf> = list_files_sorted(output_dir, &["jpg"])
        .await?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(RAW_PREFIX))
                .unwrap_or(false)
        })
        .collect();

    let mut frames = Vec::with_capacity(raw.len());
    for (j, path) in raw.into_iter().enumerate() {
        let index = j as u64 * interval;
        let target = output_dir.join(frame_file_name(index));
        move_file(&path, &target).await?;
        frames.push(SampledFrame {
            index,
            path: target,
        });
    }

    Ok(frames)
}
