//! The topic registry: registration, resolution, and invocation.
//!
//! Topics are registered explicitly at the process's composition root; the
//! built registry is immutable and lock-free to read. Every inbound call
//! resolves its topic entry, constructs a fresh topic instance, runs the
//! matched method, and drops the instance: no pooling, no cross-call
//! state.

use crate::args::CallArgs;
use crate::clients::{Clients, OutboundRelay};
use crate::context::TopicContext;
use crate::error::{InvokeError, RegistryError};
use crate::groups::ChannelManager;
use crate::topic::{Call, CallContext, ClientInterface, MethodFuture, MethodTable, Topic};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type ErasedInvoke = Box<dyn Fn(Call, String, CallArgs) -> MethodFuture + Send + Sync>;

/// Configuration record for one registered topic.
struct TopicEntry {
    identifier: &'static str,
    interface: &'static str,
    messages: &'static [&'static str],
    method_names: Vec<&'static str>,
    invoke: ErasedInvoke,
}

fn erase<T: Topic>(table: MethodTable<T>) -> ErasedInvoke {
    let table = Arc::new(table);
    Box::new(move |call: Call, message: String, args: CallArgs| {
        let table = Arc::clone(&table);
        Box::pin(async move {
            let Some(handler) = table.dispatch(&message) else {
                return Err(InvokeError::MessageNotFound {
                    topic: T::identifier().to_string(),
                    message,
                });
            };
            // Fresh instance per invocation: construct, invoke, drop.
            let instance = T::create(&call);
            handler(instance, call, args).await
        })
    })
}

/// Builds a [`TopicRegistry`] from explicit registrations.
///
/// Registration fails fast on configuration errors: duplicate identifiers,
/// duplicate client interfaces, and colliding message names are rejected
/// here rather than at call time.
#[derive(Default)]
pub struct TopicRegistryBuilder {
    entries: HashMap<&'static str, TopicEntry>,
    interfaces: HashMap<TypeId, &'static str>,
}

impl fmt::Debug for TopicRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRegistryBuilder")
            .field("topics", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TopicRegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic type.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic's identifier or client interface
    /// collides with an earlier registration, or if its message names are
    /// not unique.
    pub fn register<T: Topic>(mut self) -> Result<Self, RegistryError> {
        let identifier = T::identifier();
        if identifier.is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }
        if self.entries.contains_key(identifier) {
            return Err(RegistryError::DuplicateTopic(identifier.to_string()));
        }

        let interface_id = TypeId::of::<T::Clients>();
        if self.interfaces.contains_key(&interface_id) {
            return Err(RegistryError::DuplicateInterface(T::Clients::name()));
        }

        let messages = T::Clients::messages();
        if let Some(duplicate) = first_name_collision(messages) {
            return Err(RegistryError::DuplicateMessage {
                owner: T::Clients::name().to_string(),
                message: duplicate.to_string(),
            });
        }

        let mut table = MethodTable::new();
        T::setup(&mut table);
        if let Some(duplicate) = table.take_duplicate() {
            return Err(RegistryError::DuplicateMessage {
                owner: identifier.to_string(),
                message: duplicate,
            });
        }

        debug!(
            topic = %identifier,
            interface = %T::Clients::name(),
            methods = table.len(),
            "Registered topic"
        );

        self.interfaces.insert(interface_id, identifier);
        self.entries.insert(
            identifier,
            TopicEntry {
                identifier,
                interface: T::Clients::name(),
                messages,
                method_names: table.names(),
                invoke: erase::<T>(table),
            },
        );

        Ok(self)
    }

    /// Finish building with the outbound relay that sends go through and
    /// the channel manager that topic methods join and leave channels with.
    #[must_use]
    pub fn build(
        self,
        relay: Arc<dyn OutboundRelay>,
        channels: Arc<dyn ChannelManager>,
    ) -> TopicRegistry {
        info!(topics = self.entries.len(), "Topic registry ready");
        TopicRegistry {
            entries: self.entries,
            interfaces: self.interfaces,
            relay,
            channels,
        }
    }
}

/// Immutable lookup and dispatch surface for all registered topics.
pub struct TopicRegistry {
    entries: HashMap<&'static str, TopicEntry>,
    interfaces: HashMap<TypeId, &'static str>,
    relay: Arc<dyn OutboundRelay>,
    channels: Arc<dyn ChannelManager>,
}

impl TopicRegistry {
    /// Invoke a topic method on behalf of a connection.
    ///
    /// Resolves the topic by exact identifier, matches the message name
    /// case-insensitively, coerces arguments positionally, and awaits the
    /// method. The error's `Display` text is the fault message for the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution, argument binding, or the method
    /// itself fails.
    pub async fn invoke(
        &self,
        context: CallContext,
        topic: &str,
        message: &str,
        args: Vec<Value>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>, InvokeError> {
        let entry = self
            .entries
            .get(topic)
            .ok_or_else(|| InvokeError::TopicNotFound(topic.to_string()))?;

        let clients = Clients::new(
            Arc::clone(&self.relay),
            entry.identifier,
            entry.interface,
            entry.messages,
            Some(context.connection_id.clone()),
        );
        let call = Call::new(context, clients, Arc::clone(&self.channels), cancel.clone());
        let call_args = CallArgs::new(args, cancel);

        (entry.invoke)(call, message.to_string(), call_args).await
    }

    /// Obtain the shared outbound context for the topic declaring client
    /// interface `C`.
    ///
    /// # Errors
    ///
    /// Returns an error if no registered topic declares `C`.
    pub fn context<C: ClientInterface>(&self) -> Result<TopicContext<C>, RegistryError> {
        let identifier = self
            .interfaces
            .get(&TypeId::of::<C>())
            .ok_or_else(|| RegistryError::InterfaceNotFound(C::name()))?;
        let entry = &self.entries[identifier];

        Ok(TopicContext::new(Clients::new(
            Arc::clone(&self.relay),
            entry.identifier,
            entry.interface,
            entry.messages,
            None,
        )))
    }

    /// Whether a topic identifier is registered.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    /// All registered topic identifiers.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Declared method names of a topic, if registered.
    #[must_use]
    pub fn methods_of(&self, topic: &str) -> Option<&[&'static str]> {
        self.entries
            .get(topic)
            .map(|entry| entry.method_names.as_slice())
    }

    /// Number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn first_name_collision(names: &[&'static str]) -> Option<&'static str> {
    let mut seen = HashMap::with_capacity(names.len());
    for name in names {
        if let Some(_prior) = seen.insert(name.to_ascii_lowercase(), *name) {
            return Some(name);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::PushRouter;
    use crate::topic::reply;
    use serde_json::json;

    struct EchoClients;

    impl ClientInterface for EchoClients {
        fn name() -> &'static str {
            "EchoClients"
        }

        fn messages() -> &'static [&'static str] {
            &["Pong"]
        }
    }

    struct Echo;

    impl Topic for Echo {
        type Clients = EchoClients;

        fn identifier() -> &'static str {
            "echo"
        }

        fn create(_: &Call) -> Self {
            Echo
        }

        fn setup(methods: &mut MethodTable<Self>) {
            methods.handle("Ping", |_topic, _call, mut args| async move {
                let _text: String = args.take()?;
                let value: i32 = args.take()?;
                reply(value)
            });
            methods.handle("Boom", |_topic, _call, _args| async move {
                Err(InvokeError::method("boom"))
            });
            methods.handle("WhoAmI", |_topic, call, _args| async move {
                reply(call.context.connection_id.clone())
            });
        }
    }

    struct CounterClients;

    impl ClientInterface for CounterClients {
        fn name() -> &'static str {
            "CounterClients"
        }

        fn messages() -> &'static [&'static str] {
            &[]
        }
    }

    #[derive(Default)]
    struct Counter {
        hits: u32,
    }

    impl Topic for Counter {
        type Clients = CounterClients;

        fn identifier() -> &'static str {
            "counter"
        }

        fn create(_: &Call) -> Self {
            Counter::default()
        }

        fn setup(methods: &mut MethodTable<Self>) {
            methods.handle("Bump", |mut topic, _call, _args| async move {
                topic.hits += 1;
                reply(topic.hits)
            });
        }
    }

    struct RoomClients;

    impl ClientInterface for RoomClients {
        fn name() -> &'static str {
            "RoomClients"
        }

        fn messages() -> &'static [&'static str] {
            &["Announce"]
        }
    }

    struct Room;

    impl Topic for Room {
        type Clients = RoomClients;

        fn identifier() -> &'static str {
            "room"
        }

        fn create(_: &Call) -> Self {
            Room
        }

        fn setup(methods: &mut MethodTable<Self>) {
            methods.handle("Join", |_topic, call, mut args| async move {
                let channel: String = args.take()?;
                call.channels
                    .add_to_channel(&call.context.connection_id, &channel)
                    .await;
                call.clients
                    .channel(channel)
                    .send("Announce", vec![json!(call.context.connection_id)])
                    .await
                    .map_err(|e| InvokeError::method(e.to_string()))?;
                Ok(None)
            });
        }
    }

    struct UnclaimedClients;

    impl ClientInterface for UnclaimedClients {
        fn name() -> &'static str {
            "UnclaimedClients"
        }

        fn messages() -> &'static [&'static str] {
            &[]
        }
    }

    fn registry() -> (Arc<PushRouter>, TopicRegistry) {
        let router = Arc::new(PushRouter::new());
        let registry = TopicRegistryBuilder::new()
            .register::<Echo>()
            .unwrap()
            .register::<Counter>()
            .unwrap()
            .register::<Room>()
            .unwrap()
            .build(
                Arc::clone(&router) as Arc<dyn OutboundRelay>,
                Arc::clone(&router) as Arc<dyn ChannelManager>,
            );
        (router, registry)
    }

    fn context(conn: &str) -> CallContext {
        CallContext::anonymous(conn)
    }

    async fn invoke(
        registry: &TopicRegistry,
        conn: &str,
        topic: &str,
        message: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, InvokeError> {
        registry
            .invoke(context(conn), topic, message, args, CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_invoke_returns_payload() {
        // Scenario A: Ping(text, value) replies with value.
        let (_, registry) = registry();
        let result = invoke(&registry, "conn-1", "echo", "Ping", vec![json!("hi"), json!(42)])
            .await
            .unwrap();
        assert_eq!(result, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_message_name_is_case_insensitive() {
        let (_, registry) = registry();
        let result = invoke(&registry, "conn-1", "echo", "ping", vec![json!("hi"), json!(7)])
            .await
            .unwrap();
        assert_eq!(result, Some(json!(7)));
    }

    #[tokio::test]
    async fn test_unknown_topic_faults() {
        let (_, registry) = registry();
        let err = invoke(&registry, "conn-1", "nope", "Ping", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::TopicNotFound(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_unknown_message_faults() {
        let (_, registry) = registry();
        let err = invoke(&registry, "conn-1", "echo", "Vanish", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::MessageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_method_error_propagates_and_registry_survives() {
        // Scenario D: the fault carries the method's message and later
        // calls are unaffected.
        let (_, registry) = registry();

        let err = invoke(&registry, "conn-1", "echo", "Boom", vec![])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));

        let result = invoke(&registry, "conn-2", "echo", "Ping", vec![json!("x"), json!(1)])
            .await
            .unwrap();
        assert_eq!(result, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_fresh_instance_per_invocation() {
        // Two sequential bumps each observe exactly 1.
        let (_, registry) = registry();
        for _ in 0..2 {
            let result = invoke(&registry, "conn-1", "counter", "Bump", vec![])
                .await
                .unwrap();
            assert_eq!(result, Some(json!(1)));
        }
    }

    #[tokio::test]
    async fn test_call_context_reaches_method() {
        let (_, registry) = registry();
        let result = invoke(&registry, "conn-9", "echo", "WhoAmI", vec![])
            .await
            .unwrap();
        assert_eq!(result, Some(json!("conn-9")));
    }

    #[tokio::test]
    async fn test_channel_send_from_method() {
        // Scenario B via a live call: members of room1 hear the announce,
        // outsiders do not.
        let (router, registry) = registry();
        let mut rx_a = router.register_connection("A");
        let mut rx_b = router.register_connection("B");
        let mut rx_c = router.register_connection("C");
        router.groups().add("B", "room1");

        invoke(&registry, "A", "room", "Join", vec![json!("room1")])
            .await
            .unwrap();

        // Join put the caller into the channel before the announce.
        assert!(router.groups().is_member("A", "room1"));
        assert_eq!(rx_a.try_recv().unwrap().args, vec![json!("A")]);
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_topic_context_lookup() {
        // Scenario B from outside any call, and Scenario C for an
        // undeclared interface.
        let (router, registry) = registry();
        let mut rx_a = router.register_connection("A");
        router.groups().add("A", "room1");

        let ctx = registry.context::<RoomClients>().unwrap();
        assert_eq!(ctx.topic(), "room");
        ctx.clients()
            .channel("room1")
            .send("Announce", vec![json!("hello")])
            .await
            .unwrap();
        assert_eq!(rx_a.try_recv().unwrap().args, vec![json!("hello")]);

        // Caller addressing has no meaning on a detached context.
        assert!(ctx.clients().caller().is_err());

        let err = registry.context::<UnclaimedClients>().unwrap_err();
        assert!(matches!(err, RegistryError::InterfaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_identifier_fails_fast() {
        // Second registration under the same identifier is rejected.
        struct EchoAgain;
        impl Topic for EchoAgain {
            type Clients = UnclaimedClients;
            fn identifier() -> &'static str {
                "echo"
            }
            fn create(_: &Call) -> Self {
                EchoAgain
            }
            fn setup(_: &mut MethodTable<Self>) {}
        }

        let err = TopicRegistryBuilder::new()
            .register::<Echo>()
            .unwrap()
            .register::<EchoAgain>()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTopic(_)));
    }

    #[tokio::test]
    async fn test_duplicate_interface_fails_fast() {
        struct EchoTwin;
        impl Topic for EchoTwin {
            type Clients = EchoClients;
            fn identifier() -> &'static str {
                "echo-twin"
            }
            fn create(_: &Call) -> Self {
                EchoTwin
            }
            fn setup(_: &mut MethodTable<Self>) {}
        }

        let err = TopicRegistryBuilder::new()
            .register::<Echo>()
            .unwrap()
            .register::<EchoTwin>()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateInterface(_)));
    }

    #[tokio::test]
    async fn test_ambiguous_method_name_rejected_at_registration() {
        struct Shouty;
        impl Topic for Shouty {
            type Clients = UnclaimedClients;
            fn identifier() -> &'static str {
                "shouty"
            }
            fn create(_: &Call) -> Self {
                Shouty
            }
            fn setup(methods: &mut MethodTable<Self>) {
                methods.handle("Say", |_t, _c, _a| async { Ok(None) });
                methods.handle("SAY", |_t, _c, _a| async { Ok(None) });
            }
        }

        let err = TopicRegistryBuilder::new().register::<Shouty>().unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateMessage { .. }));
    }

    #[tokio::test]
    async fn test_argument_fault_names_position() {
        let (_, registry) = registry();
        let err = invoke(&registry, "conn-1", "echo", "Ping", vec![json!("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Argument(_)));
        assert!(err.to_string().contains("position 1"));
    }

    #[tokio::test]
    async fn test_cancellation_reaches_method() {
        struct WaitClients;
        impl ClientInterface for WaitClients {
            fn name() -> &'static str {
                "WaitClients"
            }
            fn messages() -> &'static [&'static str] {
                &[]
            }
        }

        struct Wait;
        impl Topic for Wait {
            type Clients = WaitClients;
            fn identifier() -> &'static str {
                "wait"
            }
            fn create(_: &Call) -> Self {
                Wait
            }
            fn setup(methods: &mut MethodTable<Self>) {
                methods.handle("Hold", |_topic, _call, mut args| async move {
                    let token: CancellationToken = args.take()?;
                    token.cancelled().await;
                    reply("released")
                });
            }
        }

        let router = Arc::new(PushRouter::new());
        let registry = TopicRegistryBuilder::new()
            .register::<Wait>()
            .unwrap()
            .build(
                Arc::clone(&router) as Arc<dyn OutboundRelay>,
                router as Arc<dyn ChannelManager>,
            );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry
            .invoke(context("conn-1"), "wait", "Hold", vec![], cancel)
            .await
            .unwrap();
        assert_eq!(result, Some(json!("released")));
    }

    #[tokio::test]
    async fn test_caller_send_reaches_only_caller() {
        struct PokeClients;
        impl ClientInterface for PokeClients {
            fn name() -> &'static str {
                "PokeClients"
            }
            fn messages() -> &'static [&'static str] {
                &["Poked"]
            }
        }

        struct Poke;
        impl Topic for Poke {
            type Clients = PokeClients;
            fn identifier() -> &'static str {
                "poke"
            }
            fn create(_: &Call) -> Self {
                Poke
            }
            fn setup(methods: &mut MethodTable<Self>) {
                methods.handle("Me", |_topic, call, _args| async move {
                    call.clients
                        .caller()
                        .map_err(|e| InvokeError::method(e.to_string()))?
                        .send("Poked", vec![])
                        .await
                        .map_err(|e| InvokeError::method(e.to_string()))?;
                    Ok(None)
                });
            }
        }

        let router = Arc::new(PushRouter::new());
        let registry = TopicRegistryBuilder::new()
            .register::<Poke>()
            .unwrap()
            .build(
                Arc::clone(&router) as Arc<dyn OutboundRelay>,
                Arc::clone(&router) as Arc<dyn ChannelManager>,
            );

        let mut rx_a = router.register_connection("A");
        let mut rx_b = router.register_connection("B");

        registry
            .invoke(context("A"), "poke", "Me", vec![], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rx_a.try_recv().unwrap().message, "Poked");
        assert!(rx_b.try_recv().is_err());
    }
}
