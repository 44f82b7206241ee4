//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use postlist_media::{SamplerConfig, SelectorConfig};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of all request artifact directories and the cache index
    pub work_dir: PathBuf,
    /// How long a completed result stays servable
    pub result_ttl: Duration,
    /// Maximum frames kept from one video
    pub max_selected_frames: usize,
    /// Minimum index distance between kept frames
    pub min_frame_spacing: u64,
    /// Score at or above which a frame is archived as relevant
    pub relevance_threshold: f32,
    /// Approximate number of sampled candidates per video
    pub target_candidates: u64,
    /// Sampling interval when the frame count is unknown
    pub fallback_sample_interval: u64,
    /// Interval between cache sweeps
    pub sweep_interval: Duration,
    /// Minimum spacing between two progress emissions of one request
    pub progress_emit_interval: Duration,
    /// Maximum images listed in a result
    pub max_images: usize,
    /// Upper bound for each external media tool run (yt-dlp, FFmpeg)
    pub media_timeout_secs: u64,
    /// How long terminal statuses stay pollable
    pub status_retention: Duration,
    /// Netscape cookie file handed to the downloader
    pub cookies_path: Option<PathBuf>,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp_processing"),
            result_ttl: Duration::from_secs(600),
            max_selected_frames: 30,
            min_frame_spacing: 60,
            relevance_threshold: 0.5,
            target_candidates: 300,
            fallback_sample_interval: 10,
            sweep_interval: Duration::from_secs(60),
            progress_emit_interval: Duration::from_millis(50),
            max_images: 30,
            media_timeout_secs: 600,
            status_retention: Duration::from_secs(600),
            cookies_path: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("POSTLIST_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            result_ttl: Duration::from_secs(
                std::env::var("POSTLIST_RESULT_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_selected_frames: std::env::var("POSTLIST_MAX_SELECTED_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_selected_frames),
            min_frame_spacing: std::env::var("POSTLIST_MIN_FRAME_SPACING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_frame_spacing),
            relevance_threshold: std::env::var("POSTLIST_RELEVANCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.relevance_threshold),
            target_candidates: std::env::var("POSTLIST_TARGET_CANDIDATES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.target_candidates),
            fallback_sample_interval: std::env::var("POSTLIST_FALLBACK_SAMPLE_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fallback_sample_interval),
            sweep_interval: Duration::from_secs(
                std::env::var("POSTLIST_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            progress_emit_interval: Duration::from_millis(
                std::env::var("POSTLIST_PROGRESS_EMIT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(50),
            ),
            max_images: std::env::var("POSTLIST_MAX_IMAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_images),
            media_timeout_secs: std::env::var("POSTLIST_MEDIA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.media_timeout_secs),
            status_retention: Duration::from_secs(
                std::env::var("POSTLIST_STATUS_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            cookies_path: std::env::var("POSTLIST_COOKIES_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            target_candidates: self.target_candidates,
            fallback_interval: self.fallback_sample_interval,
            timeout_secs: self.media_timeout_secs,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            max_selected: self.max_selected_frames,
            min_spacing: self.min_frame_spacing,
            relevance_threshold: self.relevance_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.result_ttl, Duration::from_secs(600));
        assert_eq!(config.work_dir, PathBuf::from("temp_processing"));
        assert_eq!(config.progress_emit_interval, Duration::from_millis(50));
        assert!(config.cookies_path.is_none());
    }

    #[test]
    fn test_selector_config_mirrors_worker_config() {
        let config = WorkerConfig {
            max_selected_frames: 5,
            min_frame_spacing: 12,
            relevance_threshold: 0.7,
            ..WorkerConfig::default()
        };
        let selector = config.selector_config();
        assert_eq!(selector.max_selected, 5);
        assert_eq!(selector.min_spacing, 12);
        assert!((selector.relevance_threshold - 0.7).abs() < f32::EPSILON);
    }
}
