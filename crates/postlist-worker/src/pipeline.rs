//! Per-request stage runner.
//!
//! One loop walks the stage sequence. Each stage returns a [`StageOutcome`];
//! degraded stages keep going with a fallback, fatal ones tear the request
//! down. Cancellation is only observed between stages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn, Instrument};

use postlist_media::fs_utils::{copy_file, move_file};
use postlist_media::{select_frames, SampledFrame};
use postlist_models::{
    image_reference, Frame, Listing, ProcessingStage, ProgressEvent, RequestId, ResultDocument,
    SourceKey,
};
use postlist_storage::{RequestDir, ResultCache};

use crate::collaborators::{Collaborators, DownloadedPost, GenerationInput};
use crate::config::WorkerConfig;
use crate::content::{fallback_listing, read_text_or_empty};
use crate::error::{StageFailure, StageOutcome, WorkerError, WorkerResult};
use crate::logging::RequestLogger;
use crate::metrics;
use crate::progress::{EventSink, ProgressHub};
use crate::session::CancelToken;

/// Frames scored concurrently against the classifier.
const CLASSIFY_CONCURRENCY: usize = 4;

/// Everything a single run needs to know about its request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub source: SourceKey,
    pub dir: RequestDir,
    pub cancel: CancelToken,
    pub logger: RequestLogger,
}

impl RequestContext {
    pub fn new(source: SourceKey, dir: RequestDir, cancel: CancelToken) -> Self {
        let request_id = dir.id().clone();
        let logger = RequestLogger::new(&request_id, &source);
        Self {
            request_id,
            source,
            dir,
            cancel,
            logger,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(ResultDocument),
    Failed(String),
    Canceled,
}

/// Intermediate products passed from stage to stage.
#[derive(Debug, Default)]
struct Artifacts {
    post: Option<DownloadedPost>,
    sampled: Vec<SampledFrame>,
    transcript: String,
    listing: Option<Listing>,
    /// Published images in rank order
    final_images: Vec<PathBuf>,
    document: Option<ResultDocument>,
}

impl Artifacts {
    fn is_video(&self) -> bool {
        self.post.as_ref().map(|p| p.is_video).unwrap_or(false)
    }

    fn video_path(&self) -> Option<&Path> {
        self.post.as_ref().and_then(|p| p.video_path.as_deref())
    }
}

/// Contents of `frames.json`.
#[derive(Debug, Serialize)]
struct FramesManifest<'a> {
    sampled: usize,
    unscored: usize,
    /// Selected frame indices, best first
    selected: Vec<u64>,
    /// Every scored candidate by ascending index
    frames: &'a [Frame],
}

/// Runs requests through the stage sequence.
pub struct Pipeline {
    config: WorkerConfig,
    cache: Arc<ResultCache>,
    collaborators: Collaborators,
    progress: Arc<ProgressHub>,
}

impl Pipeline {
    pub fn new(
        config: WorkerConfig,
        cache: Arc<ResultCache>,
        collaborators: Collaborators,
        progress: Arc<ProgressHub>,
    ) -> Self {
        Self {
            config,
            cache,
            collaborators,
            progress,
        }
    }

    /// Run one request to a terminal state.
    ///
    /// The request must already be registered with the progress hub.
    pub async fn run(&self, ctx: RequestContext, mut events: EventSink) -> RunOutcome {
        let span = ctx.logger.create_span();
        self.run_stages(&ctx, &mut events).instrument(span).await
    }

    async fn run_stages(&self, ctx: &RequestContext, events: &mut EventSink) -> RunOutcome {
        ctx.logger.log_start(&ctx.source.post_url());

        let mut artifacts = Artifacts::default();
        let mut stage = ProcessingStage::Initializing;

        while let Some(next) = stage.next(artifacts.is_video()) {
            let outcome = if ctx.cancel.is_cancelled() {
                StageFailure::Cancellation.into_outcome()
            } else {
                self.enter_stage(ctx, events, next).await;
                let started = Instant::now();
                let outcome = self.run_stage(next, ctx, &mut artifacts).await;
                metrics::record_stage_duration(next, started.elapsed().as_secs_f64());
                outcome
            };

            match outcome {
                StageOutcome::Completed => {}
                StageOutcome::Degraded(reason) => {
                    ctx.logger
                        .log_warning(&format!("{} degraded: {}", next, reason));
                    metrics::record_stage_degraded(next);
                }
                StageOutcome::Fatal(error) => {
                    return self.teardown_failed(ctx, events, next, error).await;
                }
                StageOutcome::Canceled => return self.teardown_canceled(ctx).await,
            }
            stage = next;
        }

        let Some(document) = artifacts.document.take() else {
            let error = WorkerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "pipeline finished without a result document",
            ));
            return self.teardown_failed(ctx, events, stage, error).await;
        };

        events.emit(ProgressEvent::result(document.clone())).await;
        let result = document.clone();
        self.progress
            .update(&ctx.request_id, move |s| s.complete(result))
            .await;

        metrics::record_request_completed();
        ctx.logger.log_completion(&format!(
            "{} images, expires at {}",
            document.images.len(),
            document.expires_at
        ));
        RunOutcome::Completed(document)
    }

    async fn enter_stage(&self, ctx: &RequestContext, events: &mut EventSink, stage: ProcessingStage) {
        ctx.logger.log_stage(stage);
        self.progress
            .update(&ctx.request_id, |s| s.enter_stage(stage))
            .await;
        events.emit(ProgressEvent::progress(stage)).await;
    }

    async fn run_stage(
        &self,
        stage: ProcessingStage,
        ctx: &RequestContext,
        artifacts: &mut Artifacts,
    ) -> StageOutcome {
        match stage {
            ProcessingStage::Downloading => self.download(ctx, artifacts).await,
            ProcessingStage::ExtractingFrames => self.extract_frames(ctx, artifacts).await,
            ProcessingStage::ClassifyingFrames => self.classify_frames(ctx, artifacts).await,
            ProcessingStage::Transcribing => self.transcribe(ctx, artifacts).await,
            ProcessingStage::GeneratingContent => self.generate(ctx, artifacts).await,
            ProcessingStage::Finalizing => self.finalize(ctx, artifacts).await,
            ProcessingStage::Initializing
            | ProcessingStage::Completed
            | ProcessingStage::Failed
            | ProcessingStage::Canceled => StageOutcome::Completed,
        }
    }

    async fn download(&self, ctx: &RequestContext, artifacts: &mut Artifacts) -> StageOutcome {
        let stage = ProcessingStage::Downloading;
        let post = match self
            .collaborators
            .downloader
            .download(&ctx.source, &ctx.dir)
            .await
        {
            Ok(post) => post,
            Err(e) => return StageFailure::classify(stage, e).into_outcome(),
        };

        if post.is_video && post.video_path.is_none() {
            return StageFailure::classify(
                stage,
                WorkerError::download_failed("video post without a video file"),
            )
            .into_outcome();
        }

        let mut outcome = StageOutcome::Completed;
        if !post.caption_path.exists() {
            if let Err(e) = tokio::fs::write(&post.caption_path, b"").await {
                return StageFailure::classify(stage, e.into()).into_outcome();
            }
            outcome = StageFailure::Resource("caption file missing, recreated empty".into())
                .into_outcome();
        }

        if !post.is_video {
            match self.publish_images(ctx, &post.images).await {
                Ok(images) => artifacts.final_images = images,
                Err(e) => return StageFailure::classify(stage, e).into_outcome(),
            }
        }

        artifacts.post = Some(post);
        outcome
    }

    async fn extract_frames(&self, ctx: &RequestContext, artifacts: &mut Artifacts) -> StageOutcome {
        let Some(video) = artifacts.video_path() else {
            return StageOutcome::Degraded("no video to sample".into());
        };

        let sampled = self
            .collaborators
            .extractor
            .extract(video, &ctx.dir.frames_dir())
            .await;

        if sampled.is_empty() {
            return StageOutcome::Degraded("no frames could be sampled".into());
        }
        debug!(frames = sampled.len(), "Sampled candidate frames");
        artifacts.sampled = sampled;
        StageOutcome::Completed
    }

    async fn classify_frames(&self, ctx: &RequestContext, artifacts: &mut Artifacts) -> StageOutcome {
        let sampled = std::mem::take(&mut artifacts.sampled);
        if sampled.is_empty() {
            return StageOutcome::Completed;
        }
        let sampled_count = sampled.len();

        let classifier = &self.collaborators.classifier;
        let scores: Vec<(SampledFrame, WorkerResult<f32>)> = stream::iter(sampled)
            .map(|frame| async move {
                let score = classifier.score(&frame.path).await;
                (frame, score)
            })
            .buffered(CLASSIFY_CONCURRENCY)
            .collect()
            .await;

        let mut candidates = Vec::with_capacity(scores.len());
        let mut unscored = 0usize;
        for (frame, score) in scores {
            match score {
                Ok(score) => match Frame::scored(frame.index, score, frame.path) {
                    Some(candidate) => candidates.push(candidate),
                    None => {
                        unscored += 1;
                        warn!(index = frame.index, score, "Classifier returned an invalid score");
                    }
                },
                Err(e) => {
                    unscored += 1;
                    warn!(index = frame.index, error = %e, "Frame could not be scored, excluding it");
                }
            }
        }

        let selection = select_frames(candidates, &self.config.selector_config());
        metrics::record_frames(sampled_count, selection.selected.len(), unscored);

        let (archived, archive_failures) = self
            .archive_frames(ctx, &selection.relevant, &selection.non_relevant)
            .await;

        let selected_paths: Vec<PathBuf> = selection
            .selected
            .iter()
            .map(|f| archived.get(&f.index).cloned().unwrap_or_else(|| f.path.clone()))
            .collect();

        let mut problems = Vec::new();
        if unscored > 0 {
            problems.push(format!("{} of {} frames could not be scored", unscored, sampled_count));
        }
        if archive_failures > 0 {
            problems.push(format!("{} frames could not be archived", archive_failures));
        }

        match self.publish_images(ctx, &selected_paths).await {
            Ok(images) => artifacts.final_images = images,
            Err(e) => problems.push(format!("publishing selected frames failed: {}", e)),
        }

        let mut frames: Vec<Frame> = selection
            .relevant
            .iter()
            .chain(selection.non_relevant.iter())
            .cloned()
            .map(|mut f| {
                if let Some(path) = archived.get(&f.index) {
                    f.path = path.clone();
                }
                f
            })
            .collect();
        frames.sort_by_key(|f| f.index);

        let manifest = FramesManifest {
            sampled: sampled_count,
            unscored,
            selected: selection.selected.iter().map(|f| f.index).collect(),
            frames: &frames,
        };
        if let Err(e) = write_json(&ctx.dir.frames_manifest(), &manifest).await {
            problems.push(format!("writing frames manifest failed: {}", e));
        }

        if problems.is_empty() {
            StageOutcome::Completed
        } else {
            StageOutcome::Degraded(problems.join("; "))
        }
    }

    /// Move scored frames into `relevant/` and `non_relevant/`. Returns the
    /// new path of every moved frame and the number of failed moves.
    async fn archive_frames(
        &self,
        ctx: &RequestContext,
        relevant: &[Frame],
        non_relevant: &[Frame],
    ) -> (HashMap<u64, PathBuf>, usize) {
        let mut moved = HashMap::new();
        let mut failures = 0;

        let buckets = [
            (ctx.dir.relevant_dir(), relevant),
            (ctx.dir.non_relevant_dir(), non_relevant),
        ];
        for (bucket_dir, frames) in buckets {
            for frame in frames {
                let Some(name) = frame.path.file_name() else {
                    failures += 1;
                    continue;
                };
                let target = bucket_dir.join(name);
                match move_file(&frame.path, &target).await {
                    Ok(()) => {
                        moved.insert(frame.index, target);
                    }
                    Err(e) => {
                        failures += 1;
                        debug!(index = frame.index, error = %e, "Failed to archive frame");
                    }
                }
            }
        }

        (moved, failures)
    }

    async fn transcribe(&self, ctx: &RequestContext, artifacts: &mut Artifacts) -> StageOutcome {
        let stage = ProcessingStage::Transcribing;
        let transcript_file = ctx.dir.transcript_file();

        let result = match artifacts.video_path() {
            Some(video) => {
                self.collaborators
                    .transcriber
                    .transcribe(video, &ctx.dir)
                    .await
            }
            None => Err(WorkerError::transcription_failed("no video to transcribe")),
        };

        match result {
            Ok(text) => {
                artifacts.transcript = text;
                match tokio::fs::write(&transcript_file, artifacts.transcript.as_bytes()).await {
                    Ok(()) => StageOutcome::Completed,
                    Err(e) => StageFailure::classify(stage, e.into()).into_outcome(),
                }
            }
            Err(e) => {
                artifacts.transcript.clear();
                if let Err(write_err) = tokio::fs::write(&transcript_file, b"").await {
                    debug!(error = %write_err, "Failed to write empty transcript");
                }
                StageFailure::classify(stage, e).into_outcome()
            }
        }
    }

    async fn generate(&self, ctx: &RequestContext, artifacts: &mut Artifacts) -> StageOutcome {
        let stage = ProcessingStage::GeneratingContent;
        let caption_path = artifacts
            .post
            .as_ref()
            .map(|p| p.caption_path.clone())
            .unwrap_or_else(|| ctx.dir.caption_file());
        let caption = match read_text_or_empty(&caption_path).await {
            Ok(caption) => caption,
            Err(e) => {
                warn!(error = %e, "Caption unreadable, continuing without it");
                String::new()
            }
        };

        let input = GenerationInput {
            source: &ctx.source,
            caption: &caption,
            transcript: &artifacts.transcript,
            images: &artifacts.final_images,
        };

        let (listing, outcome) = match self.collaborators.generator.generate(input).await {
            Ok(listing) if !listing.is_empty() => (listing, StageOutcome::Completed),
            Ok(_) => (
                fallback_listing(&caption, &artifacts.transcript),
                StageFailure::classify(stage, WorkerError::generation_failed("empty listing"))
                    .into_outcome(),
            ),
            Err(e) => (
                fallback_listing(&caption, &artifacts.transcript),
                StageFailure::classify(stage, e).into_outcome(),
            ),
        };

        artifacts.listing = Some(listing);
        outcome
    }

    async fn finalize(&self, ctx: &RequestContext, artifacts: &mut Artifacts) -> StageOutcome {
        let listing = artifacts.listing.take().unwrap_or_default();
        match self.persist_result(ctx, listing).await {
            Ok(document) => {
                artifacts.document = Some(document);
                StageOutcome::Completed
            }
            Err(e) => StageFailure::classify(ProcessingStage::Finalizing, e).into_outcome(),
        }
    }

    /// Write `result.json` and point the cache index at this request.
    async fn persist_result(&self, ctx: &RequestContext, listing: Listing) -> WorkerResult<ResultDocument> {
        let now = Utc::now();
        let images: Vec<String> = self
            .cache
            .list_images(&ctx.request_id)
            .await?
            .iter()
            .map(|name| image_reference(&ctx.request_id, name))
            .collect();

        let document = ResultDocument::new(
            ctx.request_id.clone(),
            listing,
            images,
            now,
            self.cache.ttl().as_secs(),
        );
        self.cache.write_result(&ctx.dir, &document).await?;
        self.cache
            .put(ctx.source.clone(), ctx.request_id.clone(), now)
            .await?;
        Ok(document)
    }

    /// Copy images into `images/` under rank-prefixed names.
    async fn publish_images(&self, ctx: &RequestContext, sources: &[PathBuf]) -> WorkerResult<Vec<PathBuf>> {
        let images_dir = ctx.dir.images_dir();
        tokio::fs::create_dir_all(&images_dir).await?;

        let mut published = Vec::with_capacity(sources.len().min(self.config.max_images));
        for (rank, source) in sources.iter().take(self.config.max_images).enumerate() {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("image_{}.jpg", rank));
            let target = images_dir.join(RequestDir::ranked_image_name(rank, &name));
            copy_file(source, &target).await?;
            published.push(target);
        }
        Ok(published)
    }

    async fn teardown_failed(
        &self,
        ctx: &RequestContext,
        events: &mut EventSink,
        stage: ProcessingStage,
        error: WorkerError,
    ) -> RunOutcome {
        let message = error.to_string();
        ctx.logger
            .log_error(&format!("{} failed: {}", stage, message));

        self.remove_artifacts(ctx).await;
        let status_message = message.clone();
        self.progress
            .update(&ctx.request_id, move |s| s.fail(status_message))
            .await;
        events.emit(ProgressEvent::error(message.clone())).await;

        metrics::record_request_failed(stage);
        RunOutcome::Failed(message)
    }

    async fn teardown_canceled(&self, ctx: &RequestContext) -> RunOutcome {
        ctx.logger.log_warning("canceled, discarding artifacts");
        self.remove_artifacts(ctx).await;
        self.progress
            .update(&ctx.request_id, |s| s.cancel())
            .await;
        metrics::record_request_canceled();
        RunOutcome::Canceled
    }

    async fn remove_artifacts(&self, ctx: &RequestContext) {
        if let Err(e) = self.cache.remove_request(&ctx.request_id).await {
            warn!(request_id = %ctx.request_id, error = %e, "Failed to delete request artifacts");
        }
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> WorkerResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
