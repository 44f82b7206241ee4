//! Request orchestration.
//!
//! Entry point for clients: starts requests (or replays a cached result),
//! exposes status polling and subscriptions, and routes cancellation.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use postlist_models::{
    ProgressEvent, RequestId, RequestStatus, ResultDocument, SessionId, SourceKey,
};
use postlist_storage::ResultCache;

use crate::collaborators::Collaborators;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::pipeline::{Pipeline, RequestContext, RunOutcome};
use crate::progress::{EventSink, ProgressHub};
use crate::session::SessionRegistry;

/// Handle returned by [`Orchestrator::start`].
#[derive(Debug)]
pub struct StartHandle {
    /// The new request, or the cached request whose result was replayed
    pub request_id: RequestId,
    pub source: SourceKey,
    /// `true` when the result came from the cache and no request was started
    pub replayed: bool,
    /// Ordered events of this request; ends after `Result` or `Error`
    pub events: mpsc::UnboundedReceiver<ProgressEvent>,
    /// The pipeline task, absent for replays
    pub task: Option<JoinHandle<RunOutcome>>,
}

/// Owns the cache, the status table and the session registry.
#[derive(Clone)]
pub struct Orchestrator {
    config: WorkerConfig,
    cache: Arc<ResultCache>,
    progress: Arc<ProgressHub>,
    sessions: Arc<SessionRegistry>,
    pipeline: Arc<Pipeline>,
}

impl Orchestrator {
    /// Open the result cache under `config.work_dir` and build an
    /// orchestrator over it.
    pub async fn new(config: WorkerConfig, collaborators: Collaborators) -> WorkerResult<Self> {
        let cache = ResultCache::open(&config.work_dir, config.result_ttl, config.max_images).await?;
        Ok(Self::with_cache(config, Arc::new(cache), collaborators))
    }

    pub fn with_cache(
        config: WorkerConfig,
        cache: Arc<ResultCache>,
        collaborators: Collaborators,
    ) -> Self {
        let progress = Arc::new(ProgressHub::new());
        let pipeline = Arc::new(Pipeline::new(
            config.clone(),
            Arc::clone(&cache),
            collaborators,
            Arc::clone(&progress),
        ));
        Self {
            config,
            cache,
            progress,
            sessions: Arc::new(SessionRegistry::new()),
            pipeline,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn progress(&self) -> &Arc<ProgressHub> {
        &self.progress
    }

    /// Start processing `source` on behalf of `session`.
    ///
    /// A fresh cached result is replayed as a single `Result` event instead.
    /// Fails only when `source` is not a recognizable post.
    pub async fn start(&self, session: &SessionId, source: &str) -> WorkerResult<StartHandle> {
        let source = SourceKey::parse(source)?;

        match self.cache.lookup(&source).await {
            Ok(Some(hit)) => {
                metrics::record_cache_hit();
                info!(
                    source = %source,
                    request_id = %hit.request_id,
                    remaining_secs = hit.remaining_secs,
                    "Replaying cached result"
                );
                let (tx, events) = mpsc::unbounded_channel();
                let _ = tx.send(ProgressEvent::result(hit.document));
                return Ok(StartHandle {
                    request_id: hit.request_id,
                    source,
                    replayed: true,
                    events,
                    task: None,
                });
            }
            Ok(None) => metrics::record_cache_miss(),
            Err(e) => {
                metrics::record_cache_miss();
                warn!(source = %source, error = %e, "Cache lookup failed, processing afresh");
            }
        }

        let request_id = RequestId::new();
        let dir = self.cache.create_request_dir(&request_id).await?;
        self.progress
            .register(RequestStatus::new(request_id.clone(), source.clone()))
            .await;
        let cancel = self.sessions.register(session, &request_id).await;

        let ctx = RequestContext::new(source.clone(), dir, cancel);
        let (sink, events) = EventSink::new(self.config.progress_emit_interval);

        metrics::record_request_started();
        let pipeline = Arc::clone(&self.pipeline);
        let sessions = Arc::clone(&self.sessions);
        let session = session.clone();
        let id = request_id.clone();
        let task = tokio::spawn(async move {
            let outcome = pipeline.run(ctx, sink).await;
            sessions.complete(&session, &id).await;
            outcome
        });

        Ok(StartHandle {
            request_id,
            source,
            replayed: false,
            events,
            task: Some(task),
        })
    }

    /// Watch a request's status.
    pub async fn subscribe(&self, request_id: &RequestId) -> Option<watch::Receiver<RequestStatus>> {
        self.progress.subscribe(request_id).await
    }

    /// Current status of a request.
    pub async fn poll(&self, request_id: &RequestId) -> Option<RequestStatus> {
        self.progress.snapshot(request_id).await
    }

    /// Request cancellation of one in-flight request. Takes effect at the
    /// next stage boundary.
    pub async fn cancel(&self, request_id: &RequestId) -> bool {
        let flagged = self.sessions.cancel(request_id).await;
        if flagged {
            info!(request_id = %request_id, "Cancellation requested");
        }
        flagged
    }

    /// Cancel every in-flight request of a session.
    pub async fn end_session(&self, session: &SessionId) -> usize {
        let flagged = self.sessions.end_session(session).await;
        if flagged > 0 {
            info!(session = %session, requests = flagged, "Session ended, canceling its requests");
        }
        flagged
    }

    /// Reload a persisted result, if its artifacts still exist.
    pub async fn result(&self, request_id: &RequestId) -> WorkerResult<Option<ResultDocument>> {
        Ok(self.cache.load_result(request_id).await?)
    }

    /// Delete a request's artifacts. Returns `false` if there was nothing to
    /// delete.
    pub async fn discard(&self, request_id: &RequestId) -> WorkerResult<bool> {
        let removed = self.cache.remove_request(request_id).await?;
        if removed {
            info!(request_id = %request_id, "Discarded request artifacts");
        }
        Ok(removed)
    }
}
