//! Frame dispatch shared by the connection read task and the public API.
//!
//! Correlates `Reply`/`Fault` frames with pending invocations and routes
//! `Send` frames to registered push handlers. Kept free of any socket so
//! the correlation logic is testable on its own.

use crate::error::ClientError;
use beacon_protocol::Frame;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Outcome delivered to a waiting invocation.
pub type InvokeOutcome = Result<Option<Value>, ClientError>;

type PushHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Pending-call table and push handler registry for one connection.
#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<InvokeOutcome>>,
    // Keyed by (topic, lowercase message): topics match exactly, message
    // names case-insensitively, mirroring the server.
    handlers: DashMap<(String, String), PushHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an invocation id and a slot for its outcome.
    pub fn register_call(&self) -> (u64, oneshot::Receiver<InvokeOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Drop the slot for a call that will never complete (send failed).
    pub fn abandon_call(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Register a push handler for a topic message.
    pub fn on<F>(&self, topic: &str, message: &str, handler: F)
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.handlers.insert(
            (topic.to_string(), message.to_ascii_lowercase()),
            Arc::new(handler),
        );
    }

    /// Route one inbound frame. Returns a frame to write back, if any.
    pub fn handle(&self, frame: Frame) -> Option<Frame> {
        match frame {
            Frame::Reply { id, payload } => {
                self.complete(id, Ok(payload));
                None
            }
            Frame::Fault { id, message } => {
                self.complete(id, Err(ClientError::Fault(message)));
                None
            }
            Frame::Send {
                topic,
                message,
                args,
            } => {
                let key = (topic, message.to_ascii_lowercase());
                // Clone the handler out so no map guard is held while it
                // runs; a handler may register or replace handlers itself.
                let handler = self
                    .handlers
                    .get(&key)
                    .map(|entry| Arc::clone(entry.value()));
                match handler {
                    Some(handler) => handler(args),
                    None => {
                        debug!(topic = %key.0, message = %key.1, "Push with no handler")
                    }
                }
                None
            }
            Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),
            Frame::Pong { .. } => None,
            other => {
                warn!(frame_type = ?other.frame_type(), "Unexpected frame from server");
                None
            }
        }
    }

    /// Fail every pending invocation. Called when the connection drops.
    pub fn close(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.complete(id, Err(ClientError::Closed));
        }
    }

    fn complete(&self, id: u64, outcome: InvokeOutcome) {
        match self.pending.remove(&id) {
            // Receiver may have given up; dropping the outcome is fine.
            Some((_, tx)) => {
                let _ = tx.send(outcome);
            }
            None => debug!(id, "Outcome for unknown invocation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reply_resolves_pending_call() {
        let dispatcher = Dispatcher::new();
        let (id, rx) = dispatcher.register_call();

        assert!(dispatcher.handle(Frame::reply(id, Some(json!(42)))).is_none());
        assert_eq!(rx.await.unwrap().unwrap(), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_fault_resolves_as_error() {
        let dispatcher = Dispatcher::new();
        let (id, rx) = dispatcher.register_call();

        dispatcher.handle(Frame::fault(id, "no such method"));
        match rx.await.unwrap() {
            Err(ClientError::Fault(message)) => assert_eq!(message, "no such method"),
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_routed_case_insensitively() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        dispatcher.on("chat", "Message", move |args| {
            assert_eq!(args, vec![json!("lobby")]);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.handle(Frame::send("chat", "MESSAGE", vec![json!("lobby")]));
        dispatcher.handle(Frame::send("chat", "message", vec![json!("lobby")]));
        // Topic identifiers match exactly.
        dispatcher.handle(Frame::send("Chat", "Message", vec![json!("lobby")]));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_may_replace_itself() {
        // A one-shot handler swaps in its replacement from inside the
        // dispatch; this must not block on the handler map.
        let dispatcher = Arc::new(Dispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let registry = Arc::clone(&dispatcher);
        let seen = Arc::clone(&calls);
        dispatcher.on("chat", "Once", move |_args| {
            seen.fetch_add(1, Ordering::SeqCst);
            registry.on("chat", "Once", |_args| {});
        });

        dispatcher.handle(Frame::send("chat", "Once", vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The replacement is in effect: the original no longer runs.
        dispatcher.handle(Frame::send("chat", "Once", vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_fails_all_pending() {
        let dispatcher = Dispatcher::new();
        let (_id_a, rx_a) = dispatcher.register_call();
        let (_id_b, rx_b) = dispatcher.register_call();

        dispatcher.close();

        assert!(matches!(rx_a.await.unwrap(), Err(ClientError::Closed)));
        assert!(matches!(rx_b.await.unwrap(), Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let dispatcher = Dispatcher::new();
        let reply = dispatcher.handle(Frame::ping(Some(7)));
        assert!(matches!(reply, Some(Frame::Pong { timestamp: Some(7) })));
    }

    #[test]
    fn test_ids_are_unique() {
        let dispatcher = Dispatcher::new();
        let (a, _rx_a) = dispatcher.register_call();
        let (b, _rx_b) = dispatcher.register_call();
        assert_ne!(a, b);
    }
}
