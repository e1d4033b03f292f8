//! Envelope types for the courier protocol
//!
//! Every unit exchanged with the relay is an [`Envelope`]: a flat JSON
//! object with five fields, discriminated by `type`.
//!
//! ```text
//! {"from":"c1","to":"server","subject":"Hello","content":"How are you?","type":"msg"}
//! ```
//!
//! # Message Flow
//!
//! 1. Client connects with `?clientID=<id>` and an `Authorization` header
//! 2. Client sends `login` carrying `{"token": ...}` and awaits any reply
//! 3. Client sends `msg`, `log` and `heartbeat` envelopes, one at a time
//! 4. Client sends `logout`, waits briefly for a reply, then closes
//!
//! # Leniency
//!
//! Senders in the wild are loosely typed, so decoding only insists on
//! `type`. Every other field falls back to an empty string, and scalars
//! are coerced to strings where a string is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::correlation::CorrelationId;
use crate::error::ProtocolError;

/// Envelope type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Session login carrying the credential
    Login,
    /// Session logout
    Logout,
    /// Application message
    Msg,
    /// Application log record
    Log,
    /// Liveness signal, no payload required
    Heartbeat,
    /// A tag this client does not know; preserved verbatim
    Unknown(String),
}

impl MessageType {
    /// All tags this client understands
    pub const KNOWN: [MessageType; 5] = [
        MessageType::Login,
        MessageType::Logout,
        MessageType::Msg,
        MessageType::Log,
        MessageType::Heartbeat,
    ];

    /// Parse a wire tag. Never fails: unrecognized tags become `Unknown`.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "msg" => Self::Msg,
            "log" => Self::Log,
            "heartbeat" => Self::Heartbeat,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Msg => "msg",
            Self::Log => "log",
            Self::Heartbeat => "heartbeat",
            Self::Unknown(tag) => tag,
        }
    }

    /// Whether this tag is one of the recognized types
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

/// Recipient of an envelope: a single identifier or a fan-out list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipient {
    /// Single recipient
    One(String),
    /// Several recipients; the relay delivers a copy to each
    Many(Vec<String>),
}

impl Recipient {
    /// Iterate over every recipient identifier
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Recipient::One(id) if id.is_empty() => Vec::new(),
            Recipient::One(id) => vec![id.as_str()],
            Recipient::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

impl Default for Recipient {
    fn default() -> Self {
        Recipient::One(String::new())
    }
}

impl From<&str> for Recipient {
    fn from(s: &str) -> Self {
        Recipient::One(s.to_string())
    }
}

impl From<String> for Recipient {
    fn from(s: String) -> Self {
        Recipient::One(s)
    }
}

impl From<Vec<String>> for Recipient {
    fn from(ids: Vec<String>) -> Self {
        Recipient::Many(ids)
    }
}

/// One message unit on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Envelope {
    /// Sender identifier
    pub from: String,
    /// Recipient(s)
    pub to: Recipient,
    /// Human-readable label
    pub subject: String,
    /// Opaque payload
    pub content: Value,
    /// Type tag
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Correlation ID of this envelope (protocol extension)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
    /// Correlation ID of the request this envelope answers (protocol extension)
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<CorrelationId>,
}

impl Envelope {
    /// Create an envelope of the given type with every other field empty
    pub fn new(message_type: MessageType) -> Self {
        Self {
            from: String::new(),
            to: Recipient::default(),
            subject: String::new(),
            content: Value::String(String::new()),
            message_type,
            id: None,
            reply_to: None,
        }
    }

    /// Login envelope carrying `{"token": credential}`
    pub fn login(credential: &str) -> Self {
        Self::new(MessageType::Login).content(serde_json::json!({ "token": credential }))
    }

    /// Logout envelope
    pub fn logout() -> Self {
        Self::new(MessageType::Logout)
    }

    /// Heartbeat envelope; carries no payload beyond the tag
    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat)
    }

    /// Set the sender
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Set the recipient(s)
    pub fn to(mut self, to: impl Into<Recipient>) -> Self {
        self.to = to.into();
        self
    }

    /// Set the subject
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the payload
    pub fn content(mut self, content: impl Into<Value>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the correlation ID
    pub fn with_id(mut self, id: CorrelationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Build a reply addressed back to the sender of `request`.
    ///
    /// The reply carries `replyTo` when the request had an `id`.
    pub fn reply_to(request: &Envelope, message_type: MessageType) -> Self {
        Self {
            from: request.to.targets().first().copied().unwrap_or("").to_string(),
            to: Recipient::One(request.from.clone()),
            subject: request.subject.clone(),
            content: Value::String(String::new()),
            message_type,
            id: None,
            reply_to: request.id.clone(),
        }
    }
}

impl TryFrom<Value> for Envelope {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let message_type = match fields.remove("type") {
            None | Some(Value::Null) => return Err(ProtocolError::MissingType),
            Some(Value::String(tag)) => MessageType::parse(&tag),
            Some(other) => return Err(ProtocolError::InvalidType(other.to_string())),
        };

        Ok(Self {
            from: lenient_string(fields.remove("from")),
            to: lenient_recipient(fields.remove("to")),
            subject: lenient_string(fields.remove("subject")),
            content: fields
                .remove("content")
                .unwrap_or_else(|| Value::String(String::new())),
            message_type,
            id: lenient_id(&mut fields, "id"),
            reply_to: lenient_id(&mut fields, "replyTo"),
        })
    }
}

/// Coerce a loosely-typed field into a string
fn lenient_string(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

fn lenient_recipient(value: Option<Value>) -> Recipient {
    match value {
        Some(Value::Array(items)) => {
            Recipient::Many(items.into_iter().map(|v| lenient_string(Some(v))).collect())
        }
        other => Recipient::One(lenient_string(other)),
    }
}

fn lenient_id(fields: &mut Map<String, Value>, key: &str) -> Option<CorrelationId> {
    match fields.remove(key) {
        None | Some(Value::Null) => None,
        other => Some(CorrelationId(lenient_string(other))),
    }
}
