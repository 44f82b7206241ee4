//! Post downloader backed by yt-dlp.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use tracing::{info, warn};

use postlist_media::{
    download_image, download_post_video, fetch_post_metadata, CookieSession, MediaError,
    PostMetadata,
};
use postlist_models::SourceKey;
use postlist_storage::RequestDir;

use crate::collaborators::{DownloadedPost, Downloader};
use crate::error::{WorkerError, WorkerResult};

/// Phrases in yt-dlp errors that point at a stale login session.
const AUTH_FAILURE_HINTS: &[&str] = &["login", "cookie", "401", "403", "rate-limit", "not available"];

/// Downloads posts with yt-dlp, images over HTTP.
pub struct YtDlpDownloader {
    cookies: CookieSession,
    http: Client,
    timeout_secs: u64,
}

impl YtDlpDownloader {
    pub fn new(cookies: CookieSession, timeout_secs: u64) -> WorkerResult<Self> {
        let http = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; postlist)")
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;
        Ok(Self {
            cookies,
            http,
            timeout_secs,
        })
    }

    pub fn cookies(&self) -> &CookieSession {
        &self.cookies
    }

    /// Fetch metadata, refreshing the cookie session once if the failure
    /// looks like an authentication problem.
    async fn metadata(&self, url: &str) -> WorkerResult<PostMetadata> {
        let cookies = self.cookies.path().await;
        match fetch_post_metadata(url, cookies.as_deref(), self.timeout_secs).await {
            Ok(metadata) => Ok(metadata),
            Err(e) if is_auth_failure(&e) => {
                warn!(error = %e, "Metadata fetch looks like an auth failure, refreshing cookies");
                if !self.cookies.refresh().await {
                    return Err(WorkerError::download_failed(e.to_string()));
                }
                let cookies = self.cookies.path().await;
                match fetch_post_metadata(url, cookies.as_deref(), self.timeout_secs).await {
                    Ok(metadata) => Ok(metadata),
                    Err(retry) => {
                        if is_auth_failure(&retry) {
                            self.cookies.invalidate().await;
                        }
                        Err(WorkerError::download_failed(retry.to_string()))
                    }
                }
            }
            Err(e) => Err(WorkerError::download_failed(e.to_string())),
        }
    }

    async fn download_images(&self, urls: &[&str], media_dir: &Path) -> WorkerResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(media_dir).await?;

        let downloads = urls.iter().enumerate().map(|(i, url)| {
            let output = media_dir.join(format!("image_{:02}.jpg", i + 1));
            async move {
                match download_image(&self.http, url, &output).await {
                    Ok(()) => Some(output),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to download post image");
                        None
                    }
                }
            }
        });

        let images: Vec<PathBuf> = join_all(downloads).await.into_iter().flatten().collect();
        if images.is_empty() {
            return Err(WorkerError::download_failed("no post image could be downloaded"));
        }
        Ok(images)
    }
}

fn is_auth_failure(error: &MediaError) -> bool {
    let message = error.to_string().to_lowercase();
    AUTH_FAILURE_HINTS.iter().any(|hint| message.contains(hint))
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, source: &SourceKey, dir: &RequestDir) -> WorkerResult<DownloadedPost> {
        let url = source.post_url();
        let metadata = self.metadata(&url).await?;

        let caption_path = dir.caption_file();
        tokio::fs::write(&caption_path, metadata.caption.as_deref().unwrap_or_default()).await?;

        if let Some(video) = metadata.first_video() {
            let video_path = dir.video_file();
            let cookies = self.cookies.path().await;
            download_post_video(
                &url,
                video.position,
                &video_path,
                cookies.as_deref(),
                self.timeout_secs,
            )
            .await
            .map_err(|e| WorkerError::download_failed(e.to_string()))?;

            info!(source = %source, "Downloaded video post");
            return Ok(DownloadedPost {
                is_video: true,
                video_path: Some(video_path),
                images: Vec::new(),
                caption_path,
            });
        }

        let urls = metadata.image_urls();
        if urls.is_empty() {
            return Err(WorkerError::download_failed("post has no downloadable media"));
        }
        let images = self.download_images(&urls, &dir.media_dir()).await?;

        info!(source = %source, images = images.len(), "Downloaded image post");
        Ok(DownloadedPost {
            is_video: false,
            video_path: None,
            images,
            caption_path,
        })
    }
}
