//! TTL result cache over request artifact directories.
//!
//! Freshness is derived from the filesystem: a request directory expires
//! `ttl` after the newest modification of the directory or anything in it.
//! The source-key index only maps a post to the request that last completed
//! it; it never extends a directory's life.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use postlist_models::{image_reference, RequestId, ResultDocument, SourceKey};

use crate::error::{StorageError, StorageResult};
use crate::layout::{RequestDir, IMAGE_EXTENSIONS};

/// Index file name inside the work directory.
pub const INDEX_FILE: &str = "index.json";

/// Index entry: which request last completed a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub request_id: RequestId,
    /// When the entry was written
    pub ts: DateTime<Utc>,
}

/// A servable cached result.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub request_id: RequestId,
    /// Document with image references and expiry recomputed at lookup time
    pub document: ResultDocument,
    /// Whole seconds until expiry, always > 0
    pub remaining_secs: u64,
}

/// Outcome of a sweep. Every request directory lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<RequestId>,
    pub kept: Vec<RequestId>,
}

/// Cache of completed results, keyed by source.
#[derive(Debug)]
pub struct ResultCache {
    work_dir: PathBuf,
    ttl: Duration,
    max_images: usize,
    index: Mutex<HashMap<SourceKey, CacheEntry>>,
}

impl ResultCache {
    /// Open the cache rooted at `work_dir`, creating it and reloading
    /// `index.json` if present. A corrupt index starts empty.
    pub async fn open(
        work_dir: impl Into<PathBuf>,
        ttl: Duration,
        max_images: usize,
    ) -> StorageResult<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir).await?;

        let index_path = work_dir.join(INDEX_FILE);
        let index = match fs::read(&index_path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<SourceKey, CacheEntry>>(&bytes) {
                Ok(index) => index,
                Err(e) => {
                    warn!(path = %index_path.display(), error = %e, "Cache index is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            work_dir = %work_dir.display(),
            entries = index.len(),
            ttl_secs = ttl.as_secs(),
            "Opened result cache"
        );

        Ok(Self {
            work_dir,
            ttl,
            max_images,
            index: Mutex::new(index),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Layout of a request directory. Rejects ids that are not a single
    /// safe path component.
    pub fn request_dir(&self, id: &RequestId) -> StorageResult<RequestDir> {
        if !id.is_path_safe() {
            return Err(StorageError::invalid_key(id.as_str()));
        }
        Ok(RequestDir::new(&self.work_dir, id.clone()))
    }

    /// Create the artifact directory for a new request.
    pub async fn create_request_dir(&self, id: &RequestId) -> StorageResult<RequestDir> {
        let dir = self.request_dir(id)?;
        fs::create_dir_all(dir.path()).await?;
        Ok(dir)
    }

    /// Look up a servable result for `key` as of now.
    pub async fn lookup(&self, key: &SourceKey) -> StorageResult<Option<CacheHit>> {
        self.lookup_at(key, SystemTime::now()).await
    }

    /// Look up a servable result for `key` as of `now`.
    ///
    /// A hit requires an index entry, `result.json`, a non-empty `images/`
    /// directory and `now - last modification < ttl`.
    pub async fn lookup_at(
        &self,
        key: &SourceKey,
        now: SystemTime,
    ) -> StorageResult<Option<CacheHit>> {
        let entry = self.index.lock().await.get(key).cloned();
        let Some(entry) = entry else {
            return Ok(None);
        };

        let dir = match self.request_dir(&entry.request_id) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(source = %key, error = %e, "Ignoring cache entry with unsafe request id");
                return Ok(None);
            }
        };

        if !is_file(&dir.result_file()).await {
            debug!(source = %key, request_id = %entry.request_id, "Cache entry has no result document");
            return Ok(None);
        }

        let images = self.list_images(&entry.request_id).await?;
        if images.is_empty() {
            debug!(source = %key, request_id = %entry.request_id, "Cache entry has no images");
            return Ok(None);
        }

        let last = latest_modification(dir.path()).await?;
        let remaining = self.remaining(last, now);
        if remaining.is_zero() {
            debug!(source = %key, request_id = %entry.request_id, "Cache entry expired");
            return Ok(None);
        }
        let remaining_secs = whole_secs_ceil(remaining);

        let mut document = read_document(&dir).await?;
        refresh_document(&mut document, &entry.request_id, &images, now, remaining_secs);

        Ok(Some(CacheHit {
            request_id: entry.request_id,
            document,
            remaining_secs,
        }))
    }

    /// Map `key` to `request_id`, replacing any prior mapping, and persist.
    pub async fn put(
        &self,
        key: SourceKey,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut index = self.index.lock().await;
        index.insert(key, CacheEntry { request_id, ts: now });
        self.persist(&index).await
    }

    /// Current index entry for `key`, regardless of freshness.
    pub async fn entry(&self, key: &SourceKey) -> Option<CacheEntry> {
        self.index.lock().await.get(key).cloned()
    }

    /// Delete stale request directories as of now.
    pub async fn sweep(&self) -> StorageResult<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// Delete every request directory whose newest modification is more
    /// than `ttl` before `now`, and drop index entries pointing at them.
    pub async fn sweep_at(&self, now: SystemTime) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = fs::read_dir(&self.work_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let id = RequestId::from(entry.file_name().to_string_lossy().to_string());
            let path = entry.path();

            let last = match latest_modification(&path).await {
                Ok(last) => last,
                Err(e) => {
                    warn!(request_id = %id, error = %e, "Could not read request directory, keeping");
                    report.kept.push(id);
                    continue;
                }
            };

            let elapsed = now.duration_since(last).unwrap_or_default();
            if elapsed <= self.ttl {
                report.kept.push(id);
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(()) => report.deleted.push(id),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.deleted.push(id),
                Err(e) => {
                    warn!(request_id = %id, error = %e, "Failed to delete stale request directory");
                    report.kept.push(id);
                }
            }
        }

        if !report.deleted.is_empty() {
            let mut index = self.index.lock().await;
            let before = index.len();
            index.retain(|_, e| !report.deleted.contains(&e.request_id));
            if index.len() != before {
                self.persist(&index).await?;
            }
        }

        Ok(report)
    }

    /// Delete a request's artifacts and any index entry pointing at them.
    /// Returns `false` if the directory did not exist.
    pub async fn remove_request(&self, id: &RequestId) -> StorageResult<bool> {
        let dir = self.request_dir(id)?;
        let existed = match fs::remove_dir_all(dir.path()).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let mut index = self.index.lock().await;
        let before = index.len();
        index.retain(|_, e| &e.request_id != id);
        if index.len() != before {
            self.persist(&index).await?;
        }

        Ok(existed)
    }

    /// Write `result.json` atomically.
    pub async fn write_result(&self, dir: &RequestDir, document: &ResultDocument) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        write_atomic(&dir.result_file(), &bytes).await
    }

    /// Reload a persisted result, with image references and expiry
    /// recomputed. `None` if the request has no result document.
    pub async fn load_result(&self, id: &RequestId) -> StorageResult<Option<ResultDocument>> {
        let dir = self.request_dir(id)?;
        if !is_file(&dir.result_file()).await {
            return Ok(None);
        }

        let now = SystemTime::now();
        let images = self.list_images(id).await?;
        let last = latest_modification(dir.path()).await?;
        let remaining_secs = whole_secs_ceil(self.remaining(last, now));

        let mut document = read_document(&dir).await?;
        refresh_document(&mut document, id, &images, now, remaining_secs);
        Ok(Some(document))
    }

    /// Final image file names of a request, sorted and capped.
    pub async fn list_images(&self, id: &RequestId) -> StorageResult<Vec<String>> {
        let images_dir = self.request_dir(id)?.images_dir();
        let mut entries = match fs::read_dir(&images_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let is_image = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
                .unwrap_or(false);
            if is_image {
                names.push(name);
            }
        }

        names.sort();
        names.truncate(self.max_images);
        Ok(names)
    }

    /// Newest modification time under a request directory.
    pub async fn latest_modification(&self, id: &RequestId) -> StorageResult<SystemTime> {
        let dir = self.request_dir(id)?;
        latest_modification(dir.path()).await
    }

    /// TTL left for a directory last modified at `last`. Zero once
    /// expired.
    fn remaining(&self, last: SystemTime, now: SystemTime) -> Duration {
        let elapsed = now.duration_since(last).unwrap_or_default();
        self.ttl.saturating_sub(elapsed)
    }

    async fn persist(&self, index: &HashMap<SourceKey, CacheEntry>) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.work_dir.join(INDEX_FILE), &bytes).await
    }
}

/// Whole seconds, rounded up so a partial second still counts.
fn whole_secs_ceil(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn read_document(dir: &RequestDir) -> StorageResult<ResultDocument> {
    let bytes = fs::read(dir.result_file()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn refresh_document(
    document: &mut ResultDocument,
    id: &RequestId,
    images: &[String],
    now: SystemTime,
    remaining_secs: u64,
) {
    document.request_id = id.clone();
    document.images = images.iter().map(|f| image_reference(id, f)).collect();
    document.expires_in_seconds = remaining_secs;
    document.expires_at =
        DateTime::<Utc>::from(now) + chrono::Duration::seconds(remaining_secs as i64);
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Newest modification time of `root` and everything beneath it.
///
/// Entries that vanish during the walk are skipped.
async fn latest_modification(root: &Path) -> StorageResult<SystemTime> {
    let mut latest = fs::metadata(root).await?.modified()?;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if let Ok(modified) = meta.modified() {
                latest = latest.max(modified);
            }
            if meta.is_dir() {
                stack.push(entry.path());
            }
        }
    }

    Ok(latest)
}
