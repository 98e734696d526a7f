//! Broadcast + history store for session events.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{SessionEvent, SkillRequestNotice, Status};

/// Default history size limit (4 MB).
const HISTORY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct StoredEvent {
    event: SessionEvent,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredEvent>,
    total_bytes: usize,
}

/// Event store with broadcast and history support.
///
/// Hosts that subscribe late receive the history first, then live events.
pub struct EventStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    /// Create a new event store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
        }
    }

    /// Push an event to both live listeners and history.
    pub fn push(&self, event: SessionEvent) {
        let _ = self.sender.send(event.clone()); // live listeners
        let bytes = event.approx_bytes();

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        while inner.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredEvent { event, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Push a status change.
    pub fn push_status(&self, status: Status) {
        self.push(SessionEvent::Status(status));
    }

    /// Push a diagnostic.
    pub fn push_diagnostic<S: Into<String>>(&self, s: S) {
        self.push(SessionEvent::Diagnostic(s.into()));
    }

    /// Push a skill request notice.
    pub fn push_skill_request(&self, notice: SkillRequestNotice) {
        self.push(SessionEvent::SkillRequest(notice));
    }

    /// Push closed notification.
    pub fn push_closed(&self) {
        self.push(SessionEvent::Closed);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<SessionEvent> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .map(|s| s.event.clone())
            .collect()
    }

    /// Most recent status, if any was reported.
    #[must_use]
    pub fn last_status(&self) -> Option<Status> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .rev()
            .find_map(|s| match s.event {
                SessionEvent::Status(status) => Some(status),
                _ => None,
            })
    }

    /// Stream that yields history first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        let (history, rx) = (self.get_history(), self.get_receiver());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }

    /// Stream of skill request notices (until Closed).
    #[must_use]
    pub fn skill_request_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, SkillRequestNotice> {
        let live = BroadcastStream::new(self.get_receiver())
            .filter_map(|res| async move { res.ok() });

        live.take_while(|event| future::ready(!matches!(event, SessionEvent::Closed)))
            .filter_map(|event| async move {
                match event {
                    SessionEvent::SkillRequest(notice) => Some(notice),
                    _ => None,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_and_last_status() {
        let store = EventStore::new();
        assert_eq!(store.last_status(), None);

        store.push_status(Status::Connecting);
        store.push_diagnostic("websocket error: refused");
        store.push_status(Status::Disconnected);

        assert_eq!(store.get_history().len(), 3);
        assert_eq!(store.last_status(), Some(Status::Disconnected));
    }

    #[test]
    fn test_history_is_bounded() {
        let store = EventStore::new();
        let chunk = "x".repeat(1024 * 1024);
        for _ in 0..8 {
            store.push_diagnostic(chunk.clone());
        }
        let history = store.get_history();
        assert!(history.len() < 8);
        assert!(!history.is_empty());
    }

    #[tokio::test]
    async fn test_history_plus_stream_replays_then_follows() {
        let store = EventStore::new();
        store.push_status(Status::Connecting);

        let mut stream = store.history_plus_stream();
        store.push_status(Status::Connected);

        assert_eq!(stream.next().await, Some(SessionEvent::Status(Status::Connecting)));
        assert_eq!(stream.next().await, Some(SessionEvent::Status(Status::Connected)));
    }

    #[tokio::test]
    async fn test_skill_request_stream_ends_on_close() {
        let store = EventStore::new();
        let mut stream = store.skill_request_stream();

        let notice = SkillRequestNotice::new(serde_json::json!({"a": 1}), uuid::Uuid::new_v4());
        store.push_status(Status::Authenticated);
        store.push_skill_request(notice.clone());
        store.push_closed();

        assert_eq!(stream.next().await, Some(notice));
        assert_eq!(stream.next().await, None);
    }
}
