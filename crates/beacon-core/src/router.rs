//! Push routing: the in-process multicast primitive behind the hub adapter.
//!
//! Each live connection registers an unbounded mpsc sender; the transport
//! binding drains the matching receiver and turns pushes into wire frames.
//! Delivery is best-effort: pushes to absent connections or empty channels
//! reach no one and are not an error.

use crate::clients::{OutboundRelay, SendTarget};
use crate::groups::{ChannelManager, Groups};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A named message on its way to one or more connections.
#[derive(Debug, Clone, PartialEq)]
pub struct Push {
    /// Originating topic identifier.
    pub topic: String,
    /// Message name from the topic's client interface.
    pub message: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl Push {
    /// Create a new push.
    #[must_use]
    pub fn new(topic: impl Into<String>, message: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            args,
        }
    }
}

/// Routes pushes to live connections, directly or through channel
/// membership.
///
/// Shared state is limited to lock-free maps; the router is safe for
/// concurrent use by many simultaneous sends.
#[derive(Default)]
pub struct PushRouter {
    connections: DashMap<String, mpsc::UnboundedSender<Arc<Push>>>,
    groups: Groups,
}

impl PushRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiver its transport binding
    /// drains. Registering an id again replaces the previous sender.
    pub fn register_connection(
        &self,
        connection_id: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<Arc<Push>> {
        let connection_id = connection_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id.clone(), tx);
        debug!(connection = %connection_id, "Connection registered");
        rx
    }

    /// Drop a connection: removes its sender and all channel memberships.
    pub fn drop_connection(&self, connection_id: &str) {
        self.connections.remove(connection_id);
        self.groups.remove_connection(connection_id);
        debug!(connection = %connection_id, "Connection dropped");
    }

    /// Channel membership maps.
    #[must_use]
    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver a push to a target. Returns the number of connections that
    /// accepted it.
    pub fn push(&self, target: &SendTarget, push: Push) -> usize {
        let push = Arc::new(push);
        let delivered = match target {
            SendTarget::Connection(id) => self.deliver(id, &push) as usize,
            SendTarget::Channel(channel) => self
                .groups
                .members(channel)
                .iter()
                .filter(|member| self.deliver(member, &push))
                .count(),
            SendTarget::All => self
                .connections
                .iter()
                .filter(|entry| entry.value().send(Arc::clone(&push)).is_ok())
                .count(),
        };

        trace!(
            topic = %push.topic,
            message = %push.message,
            target = ?target,
            delivered,
            "Routed push"
        );
        delivered
    }

    fn deliver(&self, connection_id: &str, push: &Arc<Push>) -> bool {
        // A closed receiver means the connection is mid-teardown; skip it.
        self.connections
            .get(connection_id)
            .map(|tx| tx.send(Arc::clone(push)).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl OutboundRelay for PushRouter {
    async fn relay(
        &self,
        topic: &str,
        target: SendTarget,
        message: &str,
        args: Vec<Value>,
    ) -> usize {
        self.push(&target, Push::new(topic, message, args))
    }
}

#[async_trait]
impl ChannelManager for PushRouter {
    async fn add_to_channel(&self, connection_id: &str, channel: &str) {
        self.groups.add(connection_id, channel);
    }

    async fn remove_from_channel(&self, connection_id: &str, channel: &str) {
        self.groups.remove(connection_id, channel);
    }
}
