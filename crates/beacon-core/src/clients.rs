//! The caller-clients proxy: outbound addressing and send dispatch.
//!
//! Application code addresses recipients explicitly (a single connection, a
//! named channel, everyone, or the current caller) and sends named messages
//! whose names are checked against the topic's declared client interface.
//! The actual multicast happens behind the [`OutboundRelay`] seam so the
//! core stays decoupled from any specific transport.

use crate::error::SendError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// Who an outbound send is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    /// One connection, by id.
    Connection(String),
    /// Every member of a named channel.
    Channel(String),
    /// Every connection on the transport.
    All,
}

/// The outbound multicast seam between the core and a transport binding.
///
/// A send completes when the transport has accepted it; there is no
/// delivery acknowledgement. Sends to absent connections or channels reach
/// no one and are not an error.
#[async_trait]
pub trait OutboundRelay: Send + Sync {
    /// Relay a named message to the target. Returns the number of
    /// connections the transport accepted it for.
    async fn relay(
        &self,
        topic: &str,
        target: SendTarget,
        message: &str,
        args: Vec<Value>,
    ) -> usize;
}

/// The addressing surface handed to topic methods (`call.clients`) and to
/// topic contexts obtained outside a call.
#[derive(Clone)]
pub struct Clients {
    relay: Arc<dyn OutboundRelay>,
    topic: &'static str,
    interface: &'static str,
    messages: &'static [&'static str],
    caller: Option<String>,
}

impl Clients {
    pub(crate) fn new(
        relay: Arc<dyn OutboundRelay>,
        topic: &'static str,
        interface: &'static str,
        messages: &'static [&'static str],
        caller: Option<String>,
    ) -> Self {
        Self {
            relay,
            topic,
            interface,
            messages,
            caller,
        }
    }

    /// Address a single connection by id.
    #[must_use]
    pub fn connection(&self, connection_id: impl Into<String>) -> Recipient {
        self.recipient(SendTarget::Connection(connection_id.into()))
    }

    /// Address every member of a named channel.
    #[must_use]
    pub fn channel(&self, channel: impl Into<String>) -> Recipient {
        self.recipient(SendTarget::Channel(channel.into()))
    }

    /// Address every connection.
    #[must_use]
    pub fn all(&self) -> Recipient {
        self.recipient(SendTarget::All)
    }

    /// Address the connection behind the current invocation.
    ///
    /// # Errors
    ///
    /// Returns an error when used outside an active invocation (for example
    /// through a topic context).
    pub fn caller(&self) -> Result<Recipient, SendError> {
        let caller = self.caller.clone().ok_or(SendError::NoCaller)?;
        Ok(self.recipient(SendTarget::Connection(caller)))
    }

    /// The topic identifier sends are attributed to.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.topic
    }

    fn recipient(&self, target: SendTarget) -> Recipient {
        Recipient {
            relay: Arc::clone(&self.relay),
            topic: self.topic,
            interface: self.interface,
            messages: self.messages,
            target,
        }
    }
}

/// One addressed recipient, ready to receive named messages.
pub struct Recipient {
    relay: Arc<dyn OutboundRelay>,
    topic: &'static str,
    interface: &'static str,
    messages: &'static [&'static str],
    target: SendTarget,
}

impl Recipient {
    /// Send a named message with positional arguments.
    ///
    /// Completes when the transport accepts the send; returns how many
    /// connections it was accepted for. Fire-and-forget beyond that.
    ///
    /// # Errors
    ///
    /// Returns an error if the message name is not declared on the topic's
    /// client interface.
    pub async fn send(&self, message: &str, args: Vec<Value>) -> Result<usize, SendError> {
        if !self
            .messages
            .iter()
            .any(|declared| declared.eq_ignore_ascii_case(message))
        {
            return Err(SendError::UnknownMessage {
                interface: self.interface,
                message: message.to_string(),
            });
        }

        trace!(topic = %self.topic, message = %message, target = ?self.target, "Relaying send");
        Ok(self
            .relay
            .relay(self.topic, self.target.clone(), message, args)
            .await)
    }

    /// The resolved target of this recipient.
    #[must_use]
    pub fn target(&self) -> &SendTarget {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingRelay {
        sent: Mutex<Vec<(String, SendTarget, String)>>,
    }

    #[async_trait]
    impl OutboundRelay for RecordingRelay {
        async fn relay(
            &self,
            topic: &str,
            target: SendTarget,
            message: &str,
            _args: Vec<Value>,
        ) -> usize {
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), target, message.to_string()));
            1
        }
    }

    fn clients(caller: Option<String>) -> (Arc<RecordingRelay>, Clients) {
        let relay = Arc::new(RecordingRelay {
            sent: Mutex::new(Vec::new()),
        });
        let clients = Clients::new(
            Arc::clone(&relay) as Arc<dyn OutboundRelay>,
            "chat",
            "ChatClients",
            &["Announce", "Kicked"],
            caller,
        );
        (relay, clients)
    }

    #[tokio::test]
    async fn test_channel_send() {
        let (relay, clients) = clients(None);
        let count = clients
            .channel("room1")
            .send("Announce", vec![serde_json::json!("hello")])
            .await
            .unwrap();
        assert_eq!(count, 1);

        let sent = relay.sent.lock().unwrap();
        assert_eq!(
            sent[0],
            (
                "chat".to_string(),
                SendTarget::Channel("room1".to_string()),
                "Announce".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_unknown_message_rejected() {
        let (relay, clients) = clients(None);
        let err = clients.all().send("Nope", vec![]).await.unwrap_err();
        assert!(matches!(err, SendError::UnknownMessage { .. }));
        assert!(relay.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_name_match_is_case_insensitive() {
        let (_, clients) = clients(None);
        assert!(clients.all().send("announce", vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn test_caller_requires_active_call() {
        let (_, detached) = clients(None);
        assert!(matches!(detached.caller(), Err(SendError::NoCaller)));

        let (relay, scoped) = clients(Some("conn-7".to_string()));
        scoped.caller().unwrap().send("Kicked", vec![]).await.unwrap();
        let sent = relay.sent.lock().unwrap();
        assert_eq!(sent[0].1, SendTarget::Connection("conn-7".to_string()));
    }
}
