//! Internal messages: the unit that is routed and split.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Result, RoutingError};

/// Unique, time-ordered message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Ulid);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the inner ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an actor somewhere in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorRef {
    actor_system: String,
    actor_id: String,
}

impl ActorRef {
    /// Create an actor reference.
    #[must_use]
    pub fn new(actor_system: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            actor_system: actor_system.into(),
            actor_id: actor_id.into(),
        }
    }

    /// Key used for placement and bucketing.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.actor_id
    }

    /// Actor system this actor lives in.
    #[must_use]
    pub fn actor_system(&self) -> &str {
        &self.actor_system
    }

    /// Actor id within the system.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "actor://{}/{}", self.actor_system, self.actor_id)
    }
}

/// Delivery timeout of a message.
///
/// On the wire this is an `i32` where `-1` means no timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum MessageTimeout {
    /// Never expires.
    #[default]
    None,
    /// Expires after this many seconds.
    Seconds(u32),
}

impl MessageTimeout {
    /// Wire value for "no timeout".
    pub const NO_TIMEOUT: i32 = -1;
}

impl From<MessageTimeout> for i32 {
    fn from(timeout: MessageTimeout) -> Self {
        match timeout {
            MessageTimeout::None => MessageTimeout::NO_TIMEOUT,
            MessageTimeout::Seconds(secs) => Self::try_from(secs).unwrap_or(Self::MAX),
        }
    }
}

impl TryFrom<i32> for MessageTimeout {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            Self::NO_TIMEOUT => Ok(Self::None),
            secs if secs >= 0 => u32::try_from(secs)
                .map(Self::Seconds)
                .map_err(|e| e.to_string()),
            other => Err(format!("invalid timeout {other}")),
        }
    }
}

/// Opaque tracing context, carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext(pub BTreeMap<String, String>);

/// Opaque creation context, carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationContext(pub BTreeMap<String, String>);

/// A message addressed to one or more actors.
///
/// Messages are immutable once built; splitting produces copies. Decoding
/// enforces the same non-empty receiver rule as the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct InternalMessage {
    id: MessageId,
    sender: Option<ActorRef>,
    receivers: Vec<ActorRef>,
    payload: Vec<u8>,
    payload_type: String,
    durable: bool,
    undeliverable: bool,
    timeout: MessageTimeout,
    trace_context: Option<TraceContext>,
    creation_context: Option<CreationContext>,
}

/// Decoded form of [`InternalMessage`] before validation.
#[derive(Deserialize)]
struct WireMessage {
    id: MessageId,
    sender: Option<ActorRef>,
    receivers: Vec<ActorRef>,
    payload: Vec<u8>,
    payload_type: String,
    durable: bool,
    undeliverable: bool,
    timeout: MessageTimeout,
    trace_context: Option<TraceContext>,
    creation_context: Option<CreationContext>,
}

impl TryFrom<WireMessage> for InternalMessage {
    type Error = RoutingError;

    fn try_from(wire: WireMessage) -> Result<Self> {
        if wire.receivers.is_empty() {
            return Err(RoutingError::EmptyReceivers);
        }
        Ok(Self {
            id: wire.id,
            sender: wire.sender,
            receivers: wire.receivers,
            payload: wire.payload,
            payload_type: wire.payload_type,
            durable: wire.durable,
            undeliverable: wire.undeliverable,
            timeout: wire.timeout,
            trace_context: wire.trace_context,
            creation_context: wire.creation_context,
        })
    }
}

impl InternalMessage {
    /// Create a message to several receivers.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::EmptyReceivers` if `receivers` is empty.
    pub fn new(
        sender: Option<ActorRef>,
        receivers: Vec<ActorRef>,
        payload: Vec<u8>,
        payload_type: impl Into<String>,
        durable: bool,
    ) -> Result<Self> {
        if receivers.is_empty() {
            return Err(RoutingError::EmptyReceivers);
        }
        Ok(Self {
            id: MessageId::new(),
            sender,
            receivers,
            payload,
            payload_type: payload_type.into(),
            durable,
            undeliverable: false,
            timeout: MessageTimeout::None,
            trace_context: None,
            creation_context: None,
        })
    }

    /// Create a message to a single receiver.
    #[must_use]
    pub fn to_one(
        sender: Option<ActorRef>,
        receiver: ActorRef,
        payload: Vec<u8>,
        payload_type: impl Into<String>,
        durable: bool,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            receivers: vec![receiver],
            payload,
            payload_type: payload_type.into(),
            durable,
            undeliverable: false,
            timeout: MessageTimeout::None,
            trace_context: None,
            creation_context: None,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: MessageTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the trace context.
    #[must_use]
    pub fn with_trace_context(mut self, context: TraceContext) -> Self {
        self.trace_context = Some(context);
        self
    }

    /// Set the creation context.
    #[must_use]
    pub fn with_creation_context(mut self, context: CreationContext) -> Self {
        self.creation_context = Some(context);
        self
    }

    /// Get the message ID.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Get the sender.
    #[must_use]
    pub const fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// Get the receivers.
    #[must_use]
    pub fn receivers(&self) -> &[ActorRef] {
        &self.receivers
    }

    /// Get the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload type tag.
    #[must_use]
    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    /// Whether the message must survive a restart.
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        self.durable
    }

    /// Whether the message is a dead letter.
    #[must_use]
    pub const fn is_undeliverable(&self) -> bool {
        self.undeliverable
    }

    /// Get the timeout.
    #[must_use]
    pub const fn timeout(&self) -> MessageTimeout {
        self.timeout
    }

    /// Get the trace context.
    #[must_use]
    pub const fn trace_context(&self) -> Option<&TraceContext> {
        self.trace_context.as_ref()
    }

    /// Get the creation context.
    #[must_use]
    pub const fn creation_context(&self) -> Option<&CreationContext> {
        self.creation_context.as_ref()
    }

    /// Exact duplicate, same id.
    #[must_use]
    pub fn copy_of(&self) -> Self {
        self.clone()
    }

    /// Duplicate marked as undeliverable, same id.
    #[must_use]
    pub fn as_undeliverable(&self) -> Self {
        Self {
            undeliverable: true,
            ..self.clone()
        }
    }

    /// Copy addressed to `receivers` under a fresh id.
    pub(crate) fn copy_for_receivers(&self, receivers: Vec<ActorRef>) -> Self {
        Self {
            id: MessageId::new(),
            sender: self.sender.clone(),
            receivers,
            payload: self.payload.clone(),
            payload_type: self.payload_type.clone(),
            durable: self.durable,
            undeliverable: self.undeliverable,
            timeout: self.timeout,
            trace_context: self.trace_context.clone(),
            creation_context: self.creation_context.clone(),
        }
    }

    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Encode` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| RoutingError::encode(e.to_string()))
    }

    /// Decode from the wire.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Decode` if the bytes are not a message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(message, _)| message)
            .map_err(|e| RoutingError::decode(e.to_string()))
    }

    /// Render as JSON for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Encode` if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| RoutingError::encode(e.to_string()))
    }
}
