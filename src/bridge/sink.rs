//! Single-subscriber push channel.
//!
//! Events are handed off onto an unbounded channel so emitting never waits on
//! the subscriber. The subscriber drains its [`EventStream`] on whatever task
//! it owns, which keeps delivery on one consistent context regardless of the
//! thread an engine callback arrived on.

use crate::speedtest::ResultSnapshot;
use futures::Stream;
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// One item on the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Snapshot(ResultSnapshot),
    Error { message: String },
}

impl SessionEvent {
    pub fn error(message: impl Into<String>) -> Self {
        SessionEvent::Error {
            message: message.into(),
        }
    }

    pub fn snapshot(&self) -> Option<&ResultSnapshot> {
        match self {
            SessionEvent::Snapshot(snapshot) => Some(snapshot),
            SessionEvent::Error { .. } => None,
        }
    }

    /// Flat mapping of snapshot fields, or `{"error": message}`.
    pub fn to_value(&self) -> Value {
        match self {
            SessionEvent::Snapshot(snapshot) => {
                serde_json::to_value(snapshot).unwrap_or_else(|e| json!({ "error": e.to_string() }))
            }
            SessionEvent::Error { message } => json!({ "error": message }),
        }
    }
}

/// Receiving end held by the subscriber.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Waits for the next event. `None` once the subscriber was replaced or
    /// detached and everything already emitted has been drained.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Result<SessionEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Holds the current subscriber, if any.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    subscriber: Arc<Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new subscriber, replacing the previous one.
    pub fn attach(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.replace(tx).is_some() {
            debug!("Replacing existing event subscriber");
        }
        EventStream { rx }
    }

    pub fn detach(&self) {
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            debug!("Event subscriber detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Delivers `event` to the subscriber. Returns whether it was handed off.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.as_ref() else {
            return false;
        };
        if tx.send(event).is_err() {
            // Stream was dropped without an explicit detach.
            debug!("Event subscriber went away, detaching");
            *slot = None;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> SessionEvent {
        let mut snapshot = ResultSnapshot::baseline();
        snapshot.status = crate::speedtest::TestStatus::Started;
        SessionEvent::Snapshot(snapshot)
    }

    #[test]
    fn test_emit_without_subscriber_is_dropped() {
        let sink = EventSink::new();
        assert!(!sink.emit(started()));

        // Nothing is buffered for a later subscriber.
        let mut stream = sink.attach();
        assert!(stream.try_next().is_err());
    }

    #[test]
    fn test_attach_replaces_previous_subscriber() {
        let sink = EventSink::new();
        let mut first = sink.attach();
        let mut second = sink.attach();

        assert!(sink.emit(started()));

        assert_eq!(
            first.try_next(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
        assert_eq!(second.try_next(), Ok(started()));
    }

    #[test]
    fn test_detach_is_idempotent() {
        let sink = EventSink::new();
        sink.detach();

        let _stream = sink.attach();
        assert!(sink.is_attached());
        sink.detach();
        sink.detach();
        assert!(!sink.is_attached());
        assert!(!sink.emit(started()));
    }

    #[test]
    fn test_dropped_stream_counts_as_detached() {
        let sink = EventSink::new();
        drop(sink.attach());
        assert!(!sink.emit(started()));
        assert!(!sink.is_attached());
    }

    #[test]
    fn test_error_event_value() {
        let event = SessionEvent::error("Invalid settings");
        assert_eq!(event.to_value(), json!({ "error": "Invalid settings" }));
        assert!(event.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_stream_delivers_in_order_across_threads() {
        let sink = EventSink::new();
        let mut stream = sink.attach();

        let emitter = sink.clone();
        std::thread::spawn(move || {
            for percent in 0..5u8 {
                let mut snapshot = ResultSnapshot::baseline();
                snapshot.percent = percent;
                emitter.emit(SessionEvent::Snapshot(snapshot));
            }
        })
        .join()
        .unwrap();

        for expected in 0..5u8 {
            let event = stream.next().await.unwrap();
            assert_eq!(event.snapshot().unwrap().percent, expected);
        }
    }
}
