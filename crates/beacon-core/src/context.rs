//! Topic contexts: originate outbound messages with no call in flight.
//!
//! A context is obtained from the registry by client interface type and is
//! shared process-wide per topic. It is a stateless relay handle, cheap to
//! clone and safe for concurrent use from any task.

use crate::clients::Clients;
use crate::topic::ClientInterface;
use std::marker::PhantomData;

/// Outbound handle for one topic, keyed by its client interface `C`.
///
/// Supports connection, channel, and broadcast addressing; caller
/// addressing is unavailable because no invocation is in scope.
pub struct TopicContext<C: ClientInterface> {
    clients: Clients,
    _interface: PhantomData<fn() -> C>,
}

impl<C: ClientInterface> TopicContext<C> {
    pub(crate) fn new(clients: Clients) -> Self {
        Self {
            clients,
            _interface: PhantomData,
        }
    }

    /// The addressing proxy for this topic's clients.
    #[must_use]
    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// The topic identifier this context sends through.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.clients.topic()
    }
}

impl<C: ClientInterface> std::fmt::Debug for TopicContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicContext")
            .field("topic", &self.topic())
            .finish()
    }
}

impl<C: ClientInterface> Clone for TopicContext<C> {
    fn clone(&self) -> Self {
        Self {
            clients: self.clients.clone(),
            _interface: PhantomData,
        }
    }
}
