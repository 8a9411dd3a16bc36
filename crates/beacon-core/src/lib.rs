//! # beacon-core
//!
//! Topic registry, method dispatch, and channel routing for the Beacon
//! realtime messaging core.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Topic** - A unit of application logic, instantiated fresh per call
//! - **TopicRegistry** - Explicit registration, resolution, and invocation
//! - **Clients / TopicContext** - Outbound addressing (connection, channel,
//!   all, caller)
//! - **Groups / PushRouter** - Channel membership and in-process multicast
//!
//! ## Architecture
//!
//! ```text
//! inbound   Transport ──▶ Registry ──▶ Topic method ──▶ Reply/Fault
//!                                          │
//! outbound  any task ──▶ TopicContext ──▶ Clients ──▶ PushRouter ──▶ Transport
//! ```
//!
//! ## Example
//!
//! ```rust
//! use beacon_core::{
//!     reply, Call, ChannelManager, ClientInterface, MethodTable, OutboundRelay,
//!     PushRouter, Topic, TopicRegistryBuilder,
//! };
//! use std::sync::Arc;
//!
//! struct EchoClients;
//!
//! impl ClientInterface for EchoClients {
//!     fn name() -> &'static str { "EchoClients" }
//!     fn messages() -> &'static [&'static str] { &["Pong"] }
//! }
//!
//! struct Echo;
//!
//! impl Topic for Echo {
//!     type Clients = EchoClients;
//!
//!     fn identifier() -> &'static str { "echo" }
//!
//!     fn create(_: &Call) -> Self { Echo }
//!
//!     fn setup(methods: &mut MethodTable<Self>) {
//!         methods.handle("Ping", |_topic, _call, mut args| async move {
//!             let value: i32 = args.take()?;
//!             reply(value)
//!         });
//!     }
//! }
//!
//! let router = Arc::new(PushRouter::new());
//! let registry = TopicRegistryBuilder::new()
//!     .register::<Echo>()
//!     .unwrap()
//!     .build(
//!         Arc::clone(&router) as Arc<dyn OutboundRelay>,
//!         router as Arc<dyn ChannelManager>,
//!     );
//! assert!(registry.contains("echo"));
//! ```

pub mod args;
pub mod clients;
pub mod context;
pub mod error;
pub mod groups;
pub mod registry;
pub mod router;
pub mod topic;

pub use args::{CallArgs, FromCallArg};
pub use clients::{Clients, OutboundRelay, Recipient, SendTarget};
pub use context::TopicContext;
pub use error::{ArgError, InvokeError, RegistryError, SendError};
pub use groups::{ChannelManager, Groups};
pub use registry::{TopicRegistry, TopicRegistryBuilder};
pub use router::{Push, PushRouter};
pub use topic::{reply, Call, CallContext, ClientInterface, MethodTable, Topic};
