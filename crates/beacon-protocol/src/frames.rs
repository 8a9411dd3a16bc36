//! Frame types for the Beacon protocol.
//!
//! A frame is the unit of exchange between a client and the hub adapter.
//! Inbound traffic is dominated by `Invoke` (call a topic method), outbound
//! traffic by `Send` (a named message pushed to subscribed connections).
//! Frames are serialized with MessagePack.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Connect = 0x01,
    Connected = 0x02,
    Invoke = 0x03,
    Reply = 0x04,
    Fault = 0x05,
    Send = 0x06,
    Ping = 0x07,
    Pong = 0x08,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Connect),
            0x02 => Ok(FrameType::Connected),
            0x03 => Ok(FrameType::Invoke),
            0x04 => Ok(FrameType::Reply),
            0x05 => Ok(FrameType::Fault),
            0x06 => Ok(FrameType::Send),
            0x07 => Ok(FrameType::Ping),
            0x08 => Ok(FrameType::Pong),
            _ => Err("Invalid frame type"),
        }
    }
}

/// A protocol frame.
///
/// Invocation arguments and pushed message arguments travel as positional
/// [`serde_json::Value`]s; the core coerces them to the target method's
/// parameter types at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Initial handshake from the client.
    #[serde(rename = "connect")]
    Connect {
        /// Protocol version the client speaks.
        version: u8,
        /// Optional authentication token, forwarded as an opaque identity.
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Handshake response from the server.
    #[serde(rename = "connected")]
    Connected {
        /// Transport-assigned connection identifier.
        connection_id: String,
        /// Negotiated protocol version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Invoke a method on a topic.
    #[serde(rename = "invoke")]
    Invoke {
        /// Request ID, echoed back in the Reply or Fault.
        id: u64,
        /// Target topic identifier.
        topic: String,
        /// Message (method) name.
        message: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
    },

    /// Successful completion of an `Invoke`.
    #[serde(rename = "reply")]
    Reply {
        /// ID of the completed request.
        id: u64,
        /// Return value, if the method produced one.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Failed completion of an `Invoke`.
    #[serde(rename = "fault")]
    Fault {
        /// ID of the failed request.
        id: u64,
        /// Human-readable failure description.
        message: String,
    },

    /// A named message pushed from a topic to this connection.
    #[serde(rename = "send")]
    Send {
        /// Originating topic identifier.
        topic: String,
        /// Message name, one of the topic's client interface messages.
        message: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional sender timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Connect { .. } => FrameType::Connect,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Invoke { .. } => FrameType::Invoke,
            Frame::Reply { .. } => FrameType::Reply,
            Frame::Fault { .. } => FrameType::Fault,
            Frame::Send { .. } => FrameType::Send,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
        }
    }

    /// Create a new Connect frame.
    #[must_use]
    pub fn connect(version: u8, token: Option<String>) -> Self {
        Frame::Connect { version, token }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }

    /// Create a new Invoke frame.
    #[must_use]
    pub fn invoke(
        id: u64,
        topic: impl Into<String>,
        message: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Frame::Invoke {
            id,
            topic: topic.into(),
            message: message.into(),
            args,
        }
    }

    /// Create a new Reply frame.
    #[must_use]
    pub fn reply(id: u64, payload: Option<Value>) -> Self {
        Frame::Reply { id, payload }
    }

    /// Create a new Fault frame.
    #[must_use]
    pub fn fault(id: u64, message: impl Into<String>) -> Self {
        Frame::Fault {
            id,
            message: message.into(),
        }
    }

    /// Create a new Send frame.
    #[must_use]
    pub fn send(topic: impl Into<String>, message: impl Into<String>, args: Vec<Value>) -> Self {
        Frame::Send {
            topic: topic.into(),
            message: message.into(),
            args,
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping(timestamp: Option<u64>) -> Self {
        Frame::Ping { timestamp }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}
