//! Fake collaborators for orchestrator scenarios.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

use postlist_media::frames::sampler::frame_file_name;
use postlist_media::SampledFrame;
use postlist_models::{Listing, ProgressEvent, SourceKey};
use postlist_storage::RequestDir;
use postlist_worker::{
    ClassifierOracle, Collaborators, ContentGenerator, DownloadedPost, Downloader,
    FrameExtractor, GenerationInput, Orchestrator, Transcriber, WorkerConfig, WorkerError,
    WorkerResult,
};

pub const CAPTION: &str = "Handmade ceramic mug\nGlazed by hand in small batches #ceramics #mug";

/// What the fake downloader produces.
#[derive(Debug, Clone)]
pub enum PostKind {
    Video,
    Images(usize),
    Fail(String),
}

pub struct FakeDownloader {
    kind: PostKind,
    write_caption: bool,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn new(kind: PostKind) -> Self {
        Self {
            kind,
            write_caption: true,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn without_caption(mut self) -> Self {
        self.write_caption = false;
        self
    }

    /// Block each download until the gate hands out a permit.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, _source: &SourceKey, dir: &RequestDir) -> WorkerResult<DownloadedPost> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self.write_caption {
            tokio::fs::write(dir.caption_file(), CAPTION).await?;
        }

        match &self.kind {
            PostKind::Video => {
                tokio::fs::write(dir.video_file(), b"not really an mp4").await?;
                Ok(DownloadedPost {
                    is_video: true,
                    video_path: Some(dir.video_file()),
                    images: Vec::new(),
                    caption_path: dir.caption_file(),
                })
            }
            PostKind::Images(count) => {
                let media = dir.media_dir();
                tokio::fs::create_dir_all(&media).await?;
                let mut images = Vec::new();
                for i in 1..=*count {
                    let path = media.join(format!("image_{:02}.jpg", i));
                    tokio::fs::write(&path, format!("image {}", i)).await?;
                    images.push(path);
                }
                Ok(DownloadedPost {
                    is_video: false,
                    video_path: None,
                    images,
                    caption_path: dir.caption_file(),
                })
            }
            PostKind::Fail(message) => Err(WorkerError::download_failed(message.clone())),
        }
    }
}

/// Writes `count` frames spaced `interval` apart on the source timeline.
pub struct FakeExtractor {
    pub count: u64,
    pub interval: u64,
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn extract(&self, _video: &Path, frames_dir: &Path) -> Vec<SampledFrame> {
        tokio::fs::create_dir_all(frames_dir)
            .await
            .expect("create frames dir");
        let mut frames = Vec::new();
        for i in 0..self.count {
            let index = i * self.interval;
            let path = frames_dir.join(frame_file_name(index));
            tokio::fs::write(&path, format!("frame {}", index))
                .await
                .expect("write frame");
            frames.push(SampledFrame { index, path });
        }
        frames
    }
}

/// Scores frames by index: earlier frames score higher.
pub struct FakeClassifier {
    pub failing: HashSet<u64>,
    pub calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(indices: &[u64]) -> Self {
        Self {
            failing: indices.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn score_for(index: u64) -> f32 {
        1.0 - index as f32 / 1000.0
    }
}

pub fn frame_index(path: &Path) -> u64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("frame_"))
        .and_then(|s| s.parse().ok())
        .expect("frame file name")
}

#[async_trait]
impl ClassifierOracle for FakeClassifier {
    async fn score(&self, frame: &Path) -> WorkerResult<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = frame_index(frame);
        if self.failing.contains(&index) {
            return Err(WorkerError::classification_failed(format!("frame {} unreadable", index)));
        }
        Ok(Self::score_for(index))
    }
}

pub struct FakeTranscriber {
    pub result: Result<String, String>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _video: &Path, _dir: &RequestDir) -> WorkerResult<String> {
        self.result
            .clone()
            .map_err(WorkerError::transcription_failed)
    }
}

pub struct FakeGenerator {
    pub fail: bool,
    pub calls: AtomicUsize,
    /// Image file names seen by the last call
    pub seen_images: Mutex<Vec<PathBuf>>,
}

impl FakeGenerator {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicUsize::new(0),
            seen_images: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, input: GenerationInput<'_>) -> WorkerResult<Listing> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_images.lock().expect("lock") = input.images.to_vec();
        if self.fail {
            return Err(WorkerError::generation_failed("model unavailable"));
        }
        Ok(Listing {
            name: "Ceramic Mug".to_string(),
            description: format!("{} / {}", input.caption.lines().count(), input.transcript),
            keywords: vec!["mug".to_string()],
            ..Listing::default()
        })
    }
}

/// Fakes wired into an orchestrator over a temporary work directory.
pub struct Harness {
    pub work: TempDir,
    pub orchestrator: Orchestrator,
    pub downloader: Arc<FakeDownloader>,
    pub classifier: Arc<FakeClassifier>,
    pub generator: Arc<FakeGenerator>,
}

pub struct HarnessBuilder {
    downloader: FakeDownloader,
    extractor: FakeExtractor,
    classifier: FakeClassifier,
    transcript: Result<String, String>,
    generator_fails: bool,
}

impl HarnessBuilder {
    pub fn new(kind: PostKind) -> Self {
        Self {
            downloader: FakeDownloader::new(kind),
            extractor: FakeExtractor {
                count: 50,
                interval: 10,
            },
            classifier: FakeClassifier::new(),
            transcript: Ok("It holds 350 ml".to_string()),
            generator_fails: false,
        }
    }

    pub fn downloader(mut self, f: impl FnOnce(FakeDownloader) -> FakeDownloader) -> Self {
        self.downloader = f(self.downloader);
        self
    }

    pub fn classifier(mut self, classifier: FakeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn transcript(mut self, transcript: Result<String, String>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn generator_fails(mut self) -> Self {
        self.generator_fails = true;
        self
    }

    pub async fn build(self) -> Harness {
        let work = TempDir::new().expect("temp dir");
        let config = WorkerConfig {
            work_dir: work.path().to_path_buf(),
            progress_emit_interval: Duration::ZERO,
            ..WorkerConfig::default()
        };

        let downloader = Arc::new(self.downloader);
        let classifier = Arc::new(self.classifier);
        let generator = Arc::new(FakeGenerator::new(self.generator_fails));
        let collaborators = Collaborators {
            downloader: downloader.clone(),
            extractor: Arc::new(self.extractor),
            classifier: classifier.clone(),
            transcriber: Arc::new(FakeTranscriber {
                result: self.transcript,
            }),
            generator: generator.clone(),
        };

        let orchestrator = Orchestrator::new(config, collaborators)
            .await
            .expect("orchestrator");

        Harness {
            work,
            orchestrator,
            downloader,
            classifier,
            generator,
        }
    }
}

/// Drain a request's events until the channel closes.
pub async fn collect_events(events: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut collected = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("events timed out")
    {
        collected.push(event);
    }
    collected
}

/// Progress percentages of the `Progress` events, in order.
pub fn progress_values(events: &[ProgressEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { value, .. } => Some(*value),
            _ => None,
        })
        .collect()
}
