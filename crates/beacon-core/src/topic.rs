//! Topic abstraction for Beacon.
//!
//! A topic is the unit of application logic: a type bound to a client
//! interface (the set of message names it may push to clients), with a
//! method table describing the messages clients may invoke on it. A fresh
//! topic instance is created for every inbound invocation and dropped when
//! the call completes, so topic state never leaks between calls.

use crate::args::CallArgs;
use crate::clients::Clients;
use crate::error::InvokeError;
use crate::groups::ChannelManager;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a topic method: an optional RPC payload, or a fault.
pub type MethodResult = Result<Option<Value>, InvokeError>;

/// Boxed future returned by erased method handlers.
pub type MethodFuture = Pin<Box<dyn Future<Output = MethodResult> + Send>>;

/// The set of message names a topic may push to its subscribed clients.
///
/// Implemented by a marker type per topic. Message names must be unique
/// within one interface (case-insensitive); this is validated at
/// registration time.
pub trait ClientInterface: Send + Sync + 'static {
    /// Interface name, used in diagnostics.
    fn name() -> &'static str;

    /// Declared message names.
    fn messages() -> &'static [&'static str];
}

/// Identity of the connection behind the current invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Transport-assigned connection identifier.
    pub connection_id: String,
    /// Authenticated user name, if any.
    pub user: Option<String>,
}

impl CallContext {
    /// Context for a connection with no authenticated user.
    #[must_use]
    pub fn anonymous(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            user: None,
        }
    }
}

/// Everything a topic method can see about the invocation it runs in.
pub struct Call {
    /// Who is calling.
    pub context: CallContext,
    /// Outbound proxy scoped to this call (caller addressing works).
    pub clients: Clients,
    /// Channel membership, backed by the transport's grouping primitive.
    pub channels: Arc<dyn ChannelManager>,
    cancel: CancellationToken,
}

impl Call {
    pub(crate) fn new(
        context: CallContext,
        clients: Clients,
        channels: Arc<dyn ChannelManager>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            clients,
            channels,
            cancel,
        }
    }

    /// Token cancelled when the calling connection drops.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A unit of realtime application logic.
///
/// Implementations are registered once at startup via
/// [`TopicRegistryBuilder::register`](crate::registry::TopicRegistryBuilder::register)
/// and instantiated fresh for every inbound call.
pub trait Topic: Sized + Send + 'static {
    /// The client interface this topic pushes messages through.
    type Clients: ClientInterface;

    /// Unique, process-wide topic identifier. Clients reference this value
    /// on the wire. Defaults to the fully qualified type name.
    fn identifier() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Construct the per-call instance. Runs once per invocation, after the
    /// call context and clients proxy are bound.
    fn create(call: &Call) -> Self;

    /// Declare the methods clients may invoke on this topic.
    fn setup(methods: &mut MethodTable<Self>);
}

type Handler<T> = Box<dyn Fn(T, Call, CallArgs) -> MethodFuture + Send + Sync>;

struct MethodEntry<T> {
    name: &'static str,
    handler: Handler<T>,
}

/// The invokable methods of one topic, keyed by case-insensitive message
/// name.
///
/// Built once at registration; lookups afterwards are plain map reads, no
/// per-call reflection.
pub struct MethodTable<T> {
    methods: HashMap<String, MethodEntry<T>>,
    duplicate: Option<String>,
}

impl<T: Topic> MethodTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            methods: HashMap::new(),
            duplicate: None,
        }
    }

    /// Register a handler for a message name.
    ///
    /// Names are matched case-insensitively at dispatch time, so two
    /// handlers whose names differ only by case collide; the collision is
    /// reported when the topic is registered.
    pub fn handle<F, Fut>(&mut self, name: &'static str, handler: F) -> &mut Self
    where
        F: Fn(T, Call, CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        let key = name.to_ascii_lowercase();
        if self.methods.contains_key(&key) {
            self.duplicate.get_or_insert_with(|| name.to_string());
            return self;
        }
        self.methods.insert(
            key,
            MethodEntry {
                name,
                handler: Box::new(move |topic, call, args| Box::pin(handler(topic, call, args))),
            },
        );
        self
    }

    pub(crate) fn dispatch(&self, message: &str) -> Option<&Handler<T>> {
        self.methods
            .get(&message.to_ascii_lowercase())
            .map(|entry| &entry.handler)
    }

    pub(crate) fn take_duplicate(&mut self) -> Option<String> {
        self.duplicate.take()
    }

    /// Declared method names, as registered.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.methods.values().map(|entry| entry.name).collect()
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table has no methods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Serialize a method return value as the RPC payload.
///
/// # Errors
///
/// Returns a method fault if the value cannot be serialized.
pub fn reply<V: serde::Serialize>(value: V) -> MethodResult {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| InvokeError::Method(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullClients;

    impl ClientInterface for NullClients {
        fn name() -> &'static str {
            "NullClients"
        }

        fn messages() -> &'static [&'static str] {
            &[]
        }
    }

    struct Blank;

    impl Topic for Blank {
        type Clients = NullClients;

        fn identifier() -> &'static str {
            "blank"
        }

        fn create(_: &Call) -> Self {
            Blank
        }

        fn setup(_: &mut MethodTable<Self>) {}
    }

    #[test]
    fn test_case_insensitive_dispatch() {
        let mut table = MethodTable::<Blank>::new();
        table.handle("Ping", |_t, _c, _a| async { Ok(None) });

        assert!(table.dispatch("ping").is_some());
        assert!(table.dispatch("PING").is_some());
        assert!(table.dispatch("pong").is_none());
        assert_eq!(table.names(), vec!["Ping"]);
    }

    #[test]
    fn test_duplicate_names_collide() {
        let mut table = MethodTable::<Blank>::new();
        table.handle("Ping", |_t, _c, _a| async { Ok(None) });
        table.handle("ping", |_t, _c, _a| async { Ok(None) });

        assert_eq!(table.len(), 1);
        assert_eq!(table.take_duplicate().as_deref(), Some("ping"));
        // Reported once.
        assert!(table.take_duplicate().is_none());
    }

    #[test]
    fn test_default_identifier_is_type_name() {
        struct Unnamed;
        impl Topic for Unnamed {
            type Clients = NullClients;
            fn create(_: &Call) -> Self {
                Unnamed
            }
            fn setup(_: &mut MethodTable<Self>) {}
        }

        assert!(Unnamed::identifier().ends_with("Unnamed"));
    }

    #[test]
    fn test_reply_serializes() {
        assert_eq!(reply(42).unwrap(), Some(serde_json::json!(42)));
        assert_eq!(reply("hi").unwrap(), Some(serde_json::json!("hi")));
    }
}
