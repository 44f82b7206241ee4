//! Post download using yt-dlp.
//!
//! Metadata (caption, media kinds, image URLs) comes from
//! `yt-dlp --dump-single-json`. Videos are downloaded by yt-dlp itself;
//! image-only posts are fetched over HTTP from the URLs in the metadata.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::command::{check_ytdlp, stderr_tail};
use crate::error::{MediaError, MediaResult};

/// Minimum size for a valid cookies file (bytes).
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Validate that a cookies file appears to be in Netscape format.
fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| line.split('\t').count() >= 6)
}

/// Login cookies handed to yt-dlp.
///
/// yt-dlp writes cookies back after each run, so the read-only source file
/// is copied to a writable location on first use. `refresh` re-copies the
/// source (e.g. after it was rotated on disk); `invalidate` drops the
/// working copy so the next download runs anonymously until refreshed.
#[derive(Debug)]
pub struct CookieSession {
    source: Option<PathBuf>,
    working: PathBuf,
    state: Mutex<CookieState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CookieState {
    Uninitialized,
    Ready,
    Unavailable,
}

impl CookieSession {
    /// Create a session backed by `source`, copied to `working` on first use.
    pub fn new(source: Option<PathBuf>, working: impl Into<PathBuf>) -> Self {
        Self {
            source,
            working: working.into(),
            state: Mutex::new(CookieState::Uninitialized),
        }
    }

    /// A session that never supplies cookies.
    pub fn anonymous() -> Self {
        Self::new(None, PathBuf::new())
    }

    /// Path of the writable cookies file, initializing it on first call.
    pub async fn path(&self) -> Option<PathBuf> {
        let mut state = self.state.lock().await;
        if *state == CookieState::Uninitialized
            || (*state == CookieState::Ready && !self.working.exists())
        {
            *state = self.load().await;
        }
        (*state == CookieState::Ready).then(|| self.working.clone())
    }

    /// Re-copy the source cookies. Returns whether cookies are now available.
    pub async fn refresh(&self) -> bool {
        let mut state = self.state.lock().await;
        *state = self.load().await;
        *state == CookieState::Ready
    }

    /// Forget the working copy. Later downloads run without cookies until
    /// `refresh` is called.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if *state == CookieState::Ready {
            if let Err(e) = tokio::fs::remove_file(&self.working).await {
                debug!(error = %e, "Failed to remove working cookies file");
            }
        }
        *state = CookieState::Unavailable;
        info!("Cookie session invalidated");
    }

    async fn load(&self) -> CookieState {
        let Some(source) = &self.source else {
            return CookieState::Unavailable;
        };

        let content = match tokio::fs::read_to_string(source).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %source.display(), error = %e, "Cookies file not readable, skipping");
                return CookieState::Unavailable;
            }
        };

        if (content.len() as u64) < MIN_COOKIES_FILE_SIZE || !is_valid_netscape_cookies(&content) {
            warn!(path = %source.display(), "Cookies file is not in valid Netscape format, skipping");
            return CookieState::Unavailable;
        }

        if let Some(parent) = self.working.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "Failed to create cookies directory");
                return CookieState::Unavailable;
            }
        }

        match tokio::fs::write(&self.working, content).await {
            Ok(()) => {
                info!("Using cookies file for authenticated downloads");
                CookieState::Ready
            }
            Err(e) => {
                warn!(error = %e, "Failed to copy cookies file to writable location");
                CookieState::Unavailable
            }
        }
    }
}

/// One media item of a post.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// 1-based position in the post, as yt-dlp's `--playlist-items` expects
    pub position: usize,
    pub is_video: bool,
    /// Direct URL of the still image, for image items
    pub image_url: Option<String>,
}

/// Post metadata relevant to ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct PostMetadata {
    pub caption: Option<String>,
    pub items: Vec<MediaItem>,
}

impl PostMetadata {
    /// First video item, if any.
    pub fn first_video(&self) -> Option<&MediaItem> {
        self.items.iter().find(|i| i.is_video)
    }

    /// Image URLs in post order.
    pub fn image_urls(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| !i.is_video)
            .filter_map(|i| i.image_url.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    entries: Option<Vec<YtDlpInfo>>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Option<Vec<YtDlpFormat>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    #[serde(default)]
    vcodec: Option<String>,
}

impl YtDlpInfo {
    fn is_video(&self) -> bool {
        let has_codec = |v: &Option<String>| v.as_deref().map(|c| c != "none").unwrap_or(false);
        has_codec(&self.vcodec)
            || self.duration.map(|d| d > 0.0).unwrap_or(false)
            || self
                .formats
                .as_ref()
                .map(|fs| fs.iter().any(|f| has_codec(&f.vcodec)))
                .unwrap_or(false)
    }

    fn image_url(&self) -> Option<String> {
        self.thumbnail.clone().or_else(|| self.url.clone())
    }
}

/// Parse `yt-dlp --dump-single-json` output.
pub fn parse_post_metadata(json: &str) -> MediaResult<PostMetadata> {
    let info: YtDlpInfo = serde_json::from_str(json)?;

    let items = match &info.entries {
        Some(entries) if !entries.is_empty() => entries
            .iter()
            .enumerate()
            .map(|(i, e)| MediaItem {
                position: i + 1,
                is_video: e.is_video(),
                image_url: e.image_url(),
            })
            .collect(),
        _ => vec![MediaItem {
            position: 1,
            is_video: info.is_video(),
            image_url: info.image_url(),
        }],
    };

    let caption = info
        .description
        .or_else(|| {
            info.entries
                .as_ref()
                .and_then(|es| es.iter().find_map(|e| e.description.clone()))
        })
        .filter(|c| !c.trim().is_empty());

    Ok(PostMetadata { caption, items })
}

async fn run_ytdlp(args: &[String], timeout_secs: u64) -> MediaResult<Vec<u8>> {
    check_ytdlp()?;
    debug!("Running yt-dlp {}", args.join(" "));

    let child = Command::new("yt-dlp")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| MediaError::Timeout(timeout_secs))??;

    if !output.status.success() {
        let stderr = stderr_tail(&output.stderr);
        let last = stderr.lines().last().unwrap_or("Unknown error").to_string();
        debug!("yt-dlp stderr: {}", stderr);
        return Err(MediaError::download_failed(format!("yt-dlp failed: {}", last)));
    }

    Ok(output.stdout)
}

fn cookie_args(cookies: Option<&Path>) -> Vec<String> {
    cookies
        .map(|p| vec!["--cookies".to_string(), p.to_string_lossy().to_string()])
        .unwrap_or_default()
}

/// Fetch post metadata without downloading media.
pub async fn fetch_post_metadata(
    url: &str,
    cookies: Option<&Path>,
    timeout_secs: u64,
) -> MediaResult<PostMetadata> {
    let mut args = vec![
        "--dump-single-json".to_string(),
        "--no-warnings".to_string(),
        "--skip-download".to_string(),
    ];
    args.extend(cookie_args(cookies));
    args.push(url.to_string());

    let stdout = run_ytdlp(&args, timeout_secs).await?;
    parse_post_metadata(&String::from_utf8_lossy(&stdout))
}

/// Download the video at `position` of a post to `output_path` as MP4.
pub async fn download_post_video(
    url: &str,
    position: usize,
    output_path: &Path,
    cookies: Option<&Path>,
    timeout_secs: u64,
) -> MediaResult<()> {
    let mut args = vec![
        "--no-warnings".to_string(),
        "--playlist-items".to_string(),
        position.to_string(),
        "-f".to_string(),
        "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best".to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "-o".to_string(),
        output_path.to_string_lossy().to_string(),
    ];
    args.extend(cookie_args(cookies));
    args.push(url.to_string());

    run_ytdlp(&args, timeout_secs).await?;

    if !output_path.exists() {
        return Err(MediaError::download_failed("Output file not created"));
    }

    let size = output_path.metadata()?.len();
    info!(
        output = %output_path.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "Downloaded video successfully"
    );
    Ok(())
}

/// Download a still image over HTTP.
pub async fn download_image(
    client: &reqwest::Client,
    url: &str,
    output_path: &Path,
) -> MediaResult<()> {
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(MediaError::download_failed(format!("Empty image body from {}", url)));
    }
    tokio::fs::write(output_path, &bytes).await?;
    Ok(())
}
