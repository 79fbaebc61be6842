// src/domain/envelope.rs

//! The message value object carried end-to-end between client and server.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{codec, MessageId, MessageState, Result};

/// Message exchange pattern requested by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DuplexMode {
    /// Fire-and-forget. No reply is awaited or decoded.
    None,

    /// The caller expects a correlated reply.
    #[default]
    Respond,
}

/// Ordering hint for server-side scheduling; higher is more urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    #[default]
    Normal,
    Medium,
    High,
}

/// Payload encoding negotiated with the transport layer.
///
/// Each kind has a one-byte wire tag (see [`codec`](crate::codec)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransformKind {
    /// Compact binary object graph (CBOR).
    #[default]
    Object,

    /// Binary document whose body is treated as opaque pass-through bytes.
    Stream,

    /// JSON document.
    Json,
}

impl TransformKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            TransformKind::Object => 1,
            TransformKind::Stream => 2,
            TransformKind::Json => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(TransformKind::Object),
            2 => Some(TransformKind::Stream),
            3 => Some(TransformKind::Json),
            _ => None,
        }
    }
}

/// A queue message.
///
/// The identifier is fixed at creation; every other field may be adjusted
/// until the envelope is dispatched. Each call builds its own envelope, so
/// concurrent calls never share one.
///
/// # Example
///
/// ```
/// use duplex_queue::{DuplexMode, Envelope, Priority};
///
/// let env = Envelope::new("hello")
///     .with_host("orders")
///     .with_priority(Priority::High)
///     .with_duplex(DuplexMode::Respond);
///
/// assert_eq!(env.host, "orders");
/// assert_eq!(&env.body[..], b"hello");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    // ---
    id: MessageId,

    /// Logical target queue. Empty means "use the client's configured host".
    #[serde(default)]
    pub host: String,

    /// Server-side operation tag (see [`QueueCommand`](crate::QueueCommand)).
    #[serde(default)]
    pub command: String,

    /// Whether a reply is expected.
    #[serde(default)]
    pub duplex: DuplexMode,

    /// Current lifecycle state.
    #[serde(default)]
    pub state: MessageState,

    #[serde(default)]
    pub priority: Priority,

    /// Delivery attempts so far, bounded by the channel's `max_retry`.
    #[serde(default)]
    pub retry: u8,

    /// Long-poll wait in seconds for `Consume`; 0 means the configured bound.
    #[serde(default)]
    pub expiration: u32,

    #[serde(default)]
    pub transform: TransformKind,

    /// Human-readable diagnostic text.
    #[serde(default)]
    pub label: String,

    /// Opaque payload.
    #[serde(default)]
    pub body: Bytes,
}

impl Envelope {
    // ---
    /// Create an envelope with a fresh identifier and the given body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            id: MessageId::generate(),
            host: String::new(),
            command: String::new(),
            duplex: DuplexMode::default(),
            state: MessageState::Sending,
            priority: Priority::default(),
            retry: 0,
            expiration: 0,
            transform: TransformKind::default(),
            label: String::new(),
            body: body.into(),
        }
    }

    /// Create an empty-bodied envelope; used for request-only commands.
    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Create an envelope whose body is `value` encoded with `transform`.
    pub fn from_value<T: Serialize>(value: &T, transform: TransformKind) -> Result<Self> {
        let mut env = Self::empty().with_transform(transform);
        env.set_body_value(value)?;
        Ok(env)
    }

    /// Build a locally synthesized reply that never crossed the wire.
    pub(crate) fn synthesized(
        id: MessageId,
        host: impl Into<String>,
        state: MessageState,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id,
            host: host.into(),
            state,
            label: label.into(),
            ..Self::empty()
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_duplex(mut self, duplex: DuplexMode) -> Self {
        self.duplex = duplex;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_expiration(mut self, seconds: u32) -> Self {
        self.expiration = seconds;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Whether the sender awaits a reply.
    pub fn expects_reply(&self) -> bool {
        self.duplex == DuplexMode::Respond
    }

    /// Replace the body with `value` encoded using this envelope's transform.
    pub fn set_body_value<T: Serialize>(&mut self, value: &T) -> Result<()> {
        self.body = codec::encode_value(self.transform, value)?;
        Ok(())
    }

    /// Decode the body as `T` using this envelope's transform.
    pub fn body_value<T: DeserializeOwned>(&self) -> Result<T> {
        codec::decode_value(self.transform, &self.body)
    }
}
