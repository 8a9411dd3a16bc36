//! Built-in topics.
//!
//! The server ships a single `chat` topic as both a usable default and a
//! reference for application topics: channel membership through
//! `call.channels`, pushes through the clients proxy, and an RPC-style
//! reply from `Say`.

use beacon_core::{reply, Call, ClientInterface, InvokeError, MethodTable, Topic};
use serde_json::json;

/// Messages the chat topic pushes to clients.
pub struct ChatClients;

impl ClientInterface for ChatClients {
    fn name() -> &'static str {
        "ChatClients"
    }

    fn messages() -> &'static [&'static str] {
        &["Message", "Joined", "Left"]
    }
}

/// Room-based chat over channels.
pub struct Chat {
    /// Display name: the authenticated user if there is one, otherwise the
    /// connection id.
    who: String,
}

impl Topic for Chat {
    type Clients = ChatClients;

    fn identifier() -> &'static str {
        "chat"
    }

    fn create(call: &Call) -> Self {
        let who = call
            .context
            .user
            .clone()
            .unwrap_or_else(|| call.context.connection_id.clone());
        Chat { who }
    }

    fn setup(methods: &mut MethodTable<Self>) {
        methods.handle("Join", |topic, call, mut args| async move {
            let room: String = args.take()?;
            call.channels
                .add_to_channel(&call.context.connection_id, &room)
                .await;
            call.clients
                .channel(&room)
                .send("Joined", vec![json!(room), json!(topic.who)])
                .await
                .map_err(|e| InvokeError::method(e.to_string()))?;
            Ok(None)
        });

        methods.handle("Leave", |topic, call, mut args| async move {
            let room: String = args.take()?;
            call.channels
                .remove_from_channel(&call.context.connection_id, &room)
                .await;
            call.clients
                .channel(&room)
                .send("Left", vec![json!(room), json!(topic.who)])
                .await
                .map_err(|e| InvokeError::method(e.to_string()))?;
            Ok(None)
        });

        // Replies with the number of connections the message reached.
        methods.handle("Say", |topic, call, mut args| async move {
            let room: String = args.take()?;
            let text: String = args.take()?;
            let reached = call
                .clients
                .channel(&room)
                .send("Message", vec![json!(room), json!(topic.who), json!(text)])
                .await
                .map_err(|e| InvokeError::method(e.to_string()))?;
            reply(reached)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{
        CallContext, ChannelManager, OutboundRelay, PushRouter, TopicRegistryBuilder,
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn chat_registry() -> (Arc<PushRouter>, beacon_core::TopicRegistry) {
        let router = Arc::new(PushRouter::new());
        let registry = TopicRegistryBuilder::new()
            .register::<Chat>()
            .unwrap()
            .build(
                Arc::clone(&router) as Arc<dyn OutboundRelay>,
                Arc::clone(&router) as Arc<dyn ChannelManager>,
            );
        (router, registry)
    }

    #[tokio::test]
    async fn test_join_announces_to_room() {
        let (router, registry) = chat_registry();
        let mut rx_a = router.register_connection("A");
        let mut rx_b = router.register_connection("B");
        router.groups().add("B", "lobby");

        registry
            .invoke(
                CallContext::anonymous("A"),
                "chat",
                "Join",
                vec![json!("lobby")],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(router.groups().is_member("A", "lobby"));
        let push = rx_a.try_recv().unwrap();
        assert_eq!(push.message, "Joined");
        assert_eq!(push.args, vec![json!("lobby"), json!("A")]);
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_say_reports_reach_and_uses_user_name() {
        let (router, registry) = chat_registry();
        let mut rx_b = router.register_connection("B");
        router.groups().add("A", "lobby");
        router.groups().add("B", "lobby");

        let context = CallContext {
            connection_id: "A".to_string(),
            user: Some("ada".to_string()),
        };
        let reached = registry
            .invoke(
                context,
                "chat",
                "Say",
                vec![json!("lobby"), json!("hello")],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        // A has no registered receiver, so only B is reached.
        assert_eq!(reached, Some(json!(1)));
        let push = rx_b.try_recv().unwrap();
        assert_eq!(push.args, vec![json!("lobby"), json!("ada"), json!("hello")]);
    }

    #[tokio::test]
    async fn test_leave_removes_membership() {
        let (router, registry) = chat_registry();
        let _rx = router.register_connection("A");
        router.groups().add("A", "lobby");

        registry
            .invoke(
                CallContext::anonymous("A"),
                "chat",
                "Leave",
                vec![json!("lobby")],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!router.groups().is_member("A", "lobby"));
    }
}
