//! Stream session manager
//!
//! Owns at most one live generation stream. Starting a session cancels the
//! previous one and bumps a monotonic id; every delivery from a stream task
//! carries the id it was started with, and `accept` drops anything that no
//! longer matches the current session. Cancellation only asks the old task
//! to stop, so already-queued deliveries still arrive and are discarded here.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::GenerationSource;
use crate::error::StreamError;
use crate::ndjson::{LineDecoder, Record};
use crate::params::GenerationRequest;

pub type SessionId = u64;

/// What a stream task reports back
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Backend accepted the request and the body is streaming
    Opened,
    Record(Record),
    /// Body ended normally
    Ended,
    /// Transport or HTTP failure. Not retried.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub session: SessionId,
    pub event: SessionEvent,
}

/// How a fragment lands in the render buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Replace,
    Append,
}

/// A delivery that belongs to the current session
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Opened,
    Fragment {
        text: String,
        mode: ApplyMode,
        count: Option<u64>,
    },
    /// Record without renderable text
    Progress { count: Option<u64> },
    Ended,
    Failed(String),
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    request: GenerationRequest,
    reset: bool,
    first_fragment_pending: bool,
}

pub struct SessionManager {
    source: Arc<dyn GenerationSource>,
    tx: mpsc::Sender<Delivery>,
    last_id: SessionId,
    current: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new(source: Arc<dyn GenerationSource>, tx: mpsc::Sender<Delivery>) -> Self {
        Self {
            source,
            tx,
            last_id: 0,
            current: None,
        }
    }

    /// Supersede whatever is running and open a new stream with `request`
    pub fn start(&mut self, request: GenerationRequest, reset: bool) -> SessionId {
        self.cancel_current();

        self.last_id += 1;
        let id = self.last_id;
        let cancel = CancellationToken::new();

        tracing::debug!(
            session = id,
            temp = request.temperature,
            context = request.context_window,
            reset,
            "starting session"
        );

        tokio::spawn(run_stream(
            Arc::clone(&self.source),
            request,
            id,
            cancel.clone(),
            self.tx.clone(),
        ));

        self.current = Some(ActiveSession {
            id,
            cancel,
            request,
            reset,
            first_fragment_pending: true,
        });
        id
    }

    /// Cancel the live session, if any. Safe to call repeatedly.
    pub fn cancel_current(&mut self) {
        if let Some(active) = self.current.take() {
            active.cancel.cancel();
            tracing::debug!(session = active.id, "cancelled session");
        }
    }

    /// Teardown: nothing may be applied after this
    pub fn shutdown(&mut self) {
        self.cancel_current();
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.id)
    }

    /// Parameters the live session was started with
    pub fn current_request(&self) -> Option<GenerationRequest> {
        self.current.as_ref().map(|s| s.request)
    }

    /// Gate a delivery. Anything from a superseded or finished session is
    /// dropped; ended or failed sessions stop being current.
    pub fn accept(&mut self, delivery: Delivery) -> Option<Step> {
        let active = match self.current.as_mut() {
            Some(active) if active.id == delivery.session => active,
            _ => {
                tracing::trace!(session = delivery.session, "discarding stale delivery");
                return None;
            }
        };

        match delivery.event {
            SessionEvent::Opened => Some(Step::Opened),
            SessionEvent::Record(record) => {
                let count = record.count;
                match record.text.filter(|t| !t.is_empty()) {
                    Some(text) => {
                        let mode = if active.reset && active.first_fragment_pending {
                            ApplyMode::Replace
                        } else {
                            ApplyMode::Append
                        };
                        active.first_fragment_pending = false;
                        Some(Step::Fragment { text, mode, count })
                    }
                    None => Some(Step::Progress { count }),
                }
            }
            SessionEvent::Ended => {
                self.current = None;
                Some(Step::Ended)
            }
            SessionEvent::Failed(reason) => {
                self.current = None;
                Some(Step::Failed(reason))
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_current();
    }
}

/// Body of one spawned stream task
async fn run_stream(
    source: Arc<dyn GenerationSource>,
    request: GenerationRequest,
    id: SessionId,
    cancel: CancellationToken,
    tx: mpsc::Sender<Delivery>,
) {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamError::Cancelled),
        result = pump(source.as_ref(), request, id, &tx) => result,
    };

    let event = match outcome {
        Ok(()) => SessionEvent::Ended,
        Err(e) if e.is_cancellation() => {
            tracing::debug!(session = id, "stream stopped after cancellation");
            return;
        }
        Err(e) => {
            tracing::warn!(session = id, error = %e, "stream failed");
            SessionEvent::Failed(e.to_string())
        }
    };

    let _ = tx.send(Delivery { session: id, event }).await;
}

async fn pump(
    source: &dyn GenerationSource,
    request: GenerationRequest,
    id: SessionId,
    tx: &mpsc::Sender<Delivery>,
) -> Result<(), StreamError> {
    let mut chunks = source.open(request).await?;
    send(tx, id, SessionEvent::Opened).await?;

    let mut decoder = LineDecoder::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        for record in decoder.push(&chunk) {
            send(tx, id, SessionEvent::Record(record)).await?;
        }
    }
    decoder.finish();
    if decoder.malformed() > 0 {
        tracing::warn!(session = id, skipped = decoder.malformed(), "stream had malformed records");
    }

    Ok(())
}

/// A closed receiver means the app is gone, which is a stop, not a failure
async fn send(tx: &mpsc::Sender<Delivery>, session: SessionId, event: SessionEvent) -> Result<(), StreamError> {
    tx.send(Delivery { session, event })
        .await
        .map_err(|_| StreamError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChunkStream;
    use async_trait::async_trait;

    /// Serves the same canned body for every request
    struct Canned(&'static [u8]);

    #[async_trait]
    impl GenerationSource for Canned {
        async fn open(&self, _request: GenerationRequest) -> Result<ChunkStream, StreamError> {
            let chunk: Result<Vec<u8>, StreamError> = Ok(self.0.to_vec());
            Ok(futures::stream::iter(vec![chunk]).boxed())
        }
    }

    struct Refused;

    #[async_trait]
    impl GenerationSource for Refused {
        async fn open(&self, _request: GenerationRequest) -> Result<ChunkStream, StreamError> {
            Err(StreamError::Status { status: 503, body: "busy".into() })
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest { temperature: 1.0, context_window: 8 }
    }

    fn record(text: &str) -> SessionEvent {
        SessionEvent::Record(Record { text: Some(text.into()), count: None })
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_and_supersede() {
        let (tx, _rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(Arc::new(Canned(b"")), tx);

        let a = mgr.start(request(), true);
        let b = mgr.start(request(), true);
        assert!(b > a);
        assert_eq!(mgr.current_id(), Some(b));
    }

    #[tokio::test]
    async fn test_stale_delivery_is_discarded() {
        let (tx, _rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(Arc::new(Canned(b"")), tx);

        let a = mgr.start(request(), true);
        let b = mgr.start(request(), true);

        assert_eq!(mgr.accept(Delivery { session: a, event: record("stale") }), None);
        assert_eq!(
            mgr.accept(Delivery { session: b, event: record("fresh") }),
            Some(Step::Fragment { text: "fresh".into(), mode: ApplyMode::Replace, count: None })
        );
    }

    #[tokio::test]
    async fn test_first_fragment_replaces_then_appends() {
        let (tx, _rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(Arc::new(Canned(b"")), tx);
        let id = mgr.start(request(), true);

        let progress = SessionEvent::Record(Record { text: None, count: Some(0) });
        assert_eq!(
            mgr.accept(Delivery { session: id, event: progress }),
            Some(Step::Progress { count: Some(0) })
        );

        let first = mgr.accept(Delivery { session: id, event: record("a") });
        let second = mgr.accept(Delivery { session: id, event: record("b") });
        assert!(matches!(first, Some(Step::Fragment { mode: ApplyMode::Replace, .. })));
        assert!(matches!(second, Some(Step::Fragment { mode: ApplyMode::Append, .. })));
    }

    #[tokio::test]
    async fn test_non_reset_session_appends_from_start() {
        let (tx, _rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(Arc::new(Canned(b"")), tx);
        let id = mgr.start(request(), false);

        let first = mgr.accept(Delivery { session: id, event: record("a") });
        assert!(matches!(first, Some(Step::Fragment { mode: ApplyMode::Append, .. })));
    }

    #[tokio::test]
    async fn test_stream_delivers_records_then_ends() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(
            Arc::new(Canned(b"{\"text\":\"x\",\"count\":1}\n{\"text\":\"y\"}\n")),
            tx,
        );
        let id = mgr.start(request(), true);

        let mut steps = Vec::new();
        while let Some(delivery) = rx.recv().await {
            assert_eq!(delivery.session, id);
            let step = mgr.accept(delivery);
            let done = matches!(step, Some(Step::Ended));
            steps.extend(step);
            if done {
                break;
            }
        }

        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0], Step::Opened);
        assert_eq!(steps[3], Step::Ended);
        assert_eq!(mgr.current_id(), None);
    }

    #[tokio::test]
    async fn test_http_failure_is_reported_once() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(Arc::new(Refused), tx);
        let id = mgr.start(request(), true);

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.session, id);
        match mgr.accept(delivery) {
            Some(Step::Failed(reason)) => assert!(reason.contains("503")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(mgr.current_id(), None);
    }

    #[tokio::test]
    async fn test_shutdown_drops_everything() {
        let (tx, _rx) = mpsc::channel(16);
        let mut mgr = SessionManager::new(Arc::new(Canned(b"")), tx);
        let id = mgr.start(request(), true);
        mgr.shutdown();
        mgr.shutdown();

        assert_eq!(mgr.accept(Delivery { session: id, event: record("late") }), None);
    }
}
