//! Error taxonomy for the Beacon core.
//!
//! Registration errors surface once at startup, invoke errors surface to the
//! single caller that triggered them, and send errors mark programming
//! mistakes in outbound addressing. None of them are retried by the core.

use thiserror::Error;

/// Errors raised while registering topics with the registry builder.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two topics claim the same identifier.
    #[error("Duplicate topic identifier: {0}")]
    DuplicateTopic(String),

    /// Two topics claim the same client interface type.
    #[error("Duplicate client interface: {0}")]
    DuplicateInterface(&'static str),

    /// A topic identifier is empty.
    #[error("Topic identifier cannot be empty")]
    EmptyIdentifier,

    /// Two messages on the same topic or interface share a name
    /// (case-insensitive). Message names must be unique; overloads are not
    /// supported.
    #[error("Duplicate message name on {owner}: {message}")]
    DuplicateMessage { owner: String, message: String },

    /// No registered topic declares the requested client interface.
    #[error("No topic declares client interface {0}")]
    InterfaceNotFound(&'static str),
}

/// Errors surfaced to the caller of a topic invocation.
///
/// The `Display` text of these errors is the fault message a client sees.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No topic is registered under the requested identifier.
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// The topic has no method for the requested message name.
    #[error("Message not found on topic {topic}: {message}")]
    MessageNotFound { topic: String, message: String },

    /// A wire argument could not be bound to a method parameter.
    #[error("Argument binding failed: {0}")]
    Argument(#[from] ArgError),

    /// The topic method itself failed. The text passes through to the
    /// caller unchanged.
    #[error("{0}")]
    Method(String),
}

impl InvokeError {
    /// A method-level failure with the given message.
    pub fn method(message: impl Into<String>) -> Self {
        InvokeError::Method(message.into())
    }
}

/// Errors binding positional wire arguments to method parameters.
#[derive(Debug, Error)]
pub enum ArgError {
    /// The call supplied fewer arguments than the method expects.
    #[error("Missing argument at position {0}")]
    Missing(usize),

    /// The value at this position has the wrong kind entirely.
    #[error("Argument {position}: expected {expected}, got {actual}")]
    WrongKind {
        position: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// A numeric value does not fit the declared parameter type.
    #[error("Argument {position}: value {value} out of range for {target}")]
    OutOfRange {
        position: usize,
        value: i128,
        target: &'static str,
    },
}

/// Errors raised by the caller-clients proxy before a send reaches the
/// transport. Sends that reach the transport are best-effort and do not
/// fail; a send to an absent channel simply has no recipients.
#[derive(Debug, Error)]
pub enum SendError {
    /// The message name is not declared on the topic's client interface.
    #[error("Unknown message {message:?} on client interface {interface}")]
    UnknownMessage {
        interface: &'static str,
        message: String,
    },

    /// `caller()` addressing used outside an active invocation.
    #[error("No caller in scope; caller addressing is only valid inside an invocation")]
    NoCaller,
}
