//! Request status table and ordered event delivery.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::debug;

use postlist_models::{ProgressEvent, RequestId, RequestStatus};

/// Status snapshots of all known requests.
///
/// Each request has one `watch` channel: the pipeline is its only writer,
/// pollers and subscribers read clones.
#[derive(Debug, Default)]
pub struct ProgressHub {
    statuses: RwLock<HashMap<RequestId, watch::Sender<RequestStatus>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request.
    pub async fn register(&self, status: RequestStatus) -> watch::Receiver<RequestStatus> {
        let id = status.request_id.clone();
        let (tx, rx) = watch::channel(status);
        self.statuses.write().await.insert(id, tx);
        rx
    }

    /// Apply `update` to a request's status and notify subscribers.
    /// Returns the updated snapshot, or `None` for an unknown request.
    pub async fn update<F>(&self, id: &RequestId, update: F) -> Option<RequestStatus>
    where
        F: FnOnce(&mut RequestStatus),
    {
        let statuses = self.statuses.read().await;
        let tx = statuses.get(id)?;
        tx.send_modify(update);
        let snapshot = tx.borrow().clone();
        Some(snapshot)
    }

    pub async fn subscribe(&self, id: &RequestId) -> Option<watch::Receiver<RequestStatus>> {
        self.statuses.read().await.get(id).map(|tx| tx.subscribe())
    }

    pub async fn snapshot(&self, id: &RequestId) -> Option<RequestStatus> {
        self.statuses
            .read()
            .await
            .get(id)
            .map(|tx| tx.borrow().clone())
    }

    /// Drop terminal statuses last updated more than `retention` ago.
    /// Returns how many were dropped.
    pub async fn prune_terminal(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        let mut statuses = self.statuses.write().await;
        let before = statuses.len();
        statuses.retain(|_, tx| {
            let status = tx.borrow();
            !(status.is_terminal() && status.updated_at < cutoff)
        });
        before - statuses.len()
    }
}

/// Ordered event stream of one request.
///
/// Emissions closer together than `min_interval` are delayed, never dropped
/// or reordered. A closed receiver is not an error: the client went away and
/// the pipeline keeps running.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl EventSink {
    pub fn new(min_interval: Duration) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                min_interval,
                last_emit: None,
            },
            rx,
        )
    }

    pub async fn emit(&mut self, event: ProgressEvent) {
        if let Some(last) = self.last_emit {
            let next_allowed = last + self.min_interval;
            if Instant::now() < next_allowed {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        self.last_emit = Some(Instant::now());

        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}
