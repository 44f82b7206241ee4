//! Cooperative cancellation, grouped by client session.

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};

use postlist_models::{RequestId, SessionId};

/// Read side of a request's cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }
}

/// Cancellation flags of in-flight requests, per owning session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, HashMap<RequestId, watch::Sender<bool>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request` under `session` and hand back its token.
    pub async fn register(&self, session: &SessionId, request: &RequestId) -> CancelToken {
        let (tx, rx) = watch::channel(false);
        self.sessions
            .write()
            .await
            .entry(session.clone())
            .or_default()
            .insert(request.clone(), tx);
        CancelToken { rx }
    }

    /// Flag one request. Returns `false` if it is not in flight.
    pub async fn cancel(&self, request: &RequestId) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.values().find_map(|requests| requests.get(request)) {
            Some(tx) => {
                tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Flag every request of `session` and forget the session.
    /// Returns how many requests were flagged.
    pub async fn end_session(&self, session: &SessionId) -> usize {
        let Some(requests) = self.sessions.write().await.remove(session) else {
            return 0;
        };
        for tx in requests.values() {
            tx.send_replace(true);
        }
        requests.len()
    }

    /// Forget a finished request.
    pub async fn complete(&self, session: &SessionId, request: &RequestId) {
        let mut sessions = self.sessions.write().await;
        if let Some(requests) = sessions.get_mut(session) {
            requests.remove(request);
            if requests.is_empty() {
                sessions.remove(session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_single_request() {
        let registry = SessionRegistry::new();
        let session = SessionId::from_string("s1");
        let a = registry.register(&session, &RequestId::from("a")).await;
        let b = registry.register(&session, &RequestId::from("b")).await;

        assert!(registry.cancel(&RequestId::from("a")).await);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!registry.cancel(&RequestId::from("unknown")).await);
    }

    #[tokio::test]
    async fn test_end_session_flags_only_its_requests() {
        let registry = SessionRegistry::new();
        let s1 = SessionId::from_string("s1");
        let s2 = SessionId::from_string("s2");
        let a = registry.register(&s1, &RequestId::from("a")).await;
        let b = registry.register(&s1, &RequestId::from("b")).await;
        let c = registry.register(&s2, &RequestId::from("c")).await;

        assert_eq!(registry.end_session(&s1).await, 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(!c.is_cancelled());
        assert_eq!(registry.end_session(&s1).await, 0);
        assert!(!registry.cancel(&RequestId::from("a")).await);
        assert!(registry.cancel(&RequestId::from("c")).await);
    }

    #[tokio::test]
    async fn test_complete_forgets_request() {
        let registry = SessionRegistry::new();
        let session = SessionId::from_string("s1");
        let token = registry.register(&session, &RequestId::from("a")).await;

        registry.complete(&session, &RequestId::from("a")).await;
        assert_eq!(registry.end_session(&session).await, 0);
        assert!(!registry.cancel(&RequestId::from("a")).await);
        assert!(!token.is_cancelled());
        assert!(!CancelToken::never().is_cancelled());
    }
}
