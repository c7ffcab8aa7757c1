//! Wire frames: inbound classification and outbound commands.
//!
//! Inbound text is decoded into a JSON object and classified:
//!
//! - has a `type` field → [`Frame::Event`]
//! - has an integer `reply_to` and no `type` → [`Frame::Ack`]
//! - anything else → [`Frame::Ignored`]
//!
//! Outbound commands are serialized as `{"id": <n>, "type": ..., ...}`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::domain::ChannelId;
use crate::error::FrameError;

/// A server-pushed event, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    event_type: String,
    fields: Map<String, Value>,
}

impl EventFrame {
    /// Builds an event frame from a decoded object.
    ///
    /// Returns `None` if the object has no string `type` field.
    #[must_use]
    pub fn from_object(fields: Map<String, Value>) -> Option<Self> {
        let event_type = fields.get("type")?.as_str()?.to_string();
        Some(Self { event_type, fields })
    }

    /// The event type, e.g. `"channel_archive"`.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns a field of the raw frame.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns a string field of the raw frame.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// All fields of the raw frame, `type` included.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the frame, returning the raw JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Serialize for EventFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Server rejection details carried by a negative acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckError {
    /// Machine-readable code.
    pub code: String,
    /// Optional description.
    pub message: Option<String>,
}

/// Acknowledgment of a previously sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// ID of the command being acknowledged.
    pub reply_to: u64,
    /// Whether the server accepted the command.
    pub ok: bool,
    /// Present when `ok` is `false`.
    pub error: Option<AckError>,
}

impl Ack {
    fn from_object(reply_to: u64, fields: &Map<String, Value>) -> Self {
        let ok = fields.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let error = if ok {
            None
        } else {
            Some(parse_ack_error(fields.get("error")))
        };
        Self {
            reply_to,
            ok,
            error,
        }
    }
}

// `error` is either a bare code string or `{"code": .., "msg": ..}`.
fn parse_ack_error(value: Option<&Value>) -> AckError {
    match value {
        Some(Value::String(code)) => AckError {
            code: code.clone(),
            message: None,
        },
        Some(Value::Object(obj)) => {
            let code = match obj.get("code") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => "unknown_error".to_string(),
            };
            let message = obj
                .get("msg")
                .or_else(|| obj.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);
            AckError { code, message }
        }
        _ => AckError {
            code: "unknown_error".to_string(),
            message: None,
        },
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Server-pushed event.
    Event(EventFrame),
    /// Acknowledgment of an outbound command.
    Ack(Ack),
    /// Neither; dropped by the dispatcher.
    Ignored,
}

impl Frame {
    /// Decodes and classifies a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Json`] for malformed JSON and
    /// [`FrameError::NotAnObject`] when the JSON is not an object.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self::classify(fields)),
            _ => Err(FrameError::NotAnObject),
        }
    }

    /// Classifies a decoded object.
    #[must_use]
    pub fn classify(fields: Map<String, Value>) -> Self {
        if fields.contains_key("type") {
            return EventFrame::from_object(fields).map_or(Self::Ignored, Self::Event);
        }
        match fields.get("reply_to").and_then(Value::as_u64) {
            Some(reply_to) => Self::Ack(Ack::from_object(reply_to, &fields)),
            None => Self::Ignored,
        }
    }
}

/// A command the client can send over the live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Post a plain-text message to a conversation.
    Message {
        /// Target conversation.
        channel: ChannelId,
        /// Message text.
        text: String,
    },
    /// Show the typing indicator in a conversation.
    Typing {
        /// Target conversation.
        channel: ChannelId,
    },
    /// Keep-alive ping.
    Ping,
}

impl Command {
    /// Builds a [`Command::Message`].
    #[must_use]
    pub fn message(channel: impl Into<ChannelId>, text: impl Into<String>) -> Self {
        Self::Message {
            channel: channel.into(),
            text: text.into(),
        }
    }

    /// Builds a [`Command::Typing`].
    #[must_use]
    pub fn typing(channel: impl Into<ChannelId>) -> Self {
        Self::Typing {
            channel: channel.into(),
        }
    }
}

/// A command with its correlation ID attached, ready for the wire.
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    /// Correlation ID echoed back as `reply_to`.
    pub id: u64,
    /// The command body.
    #[serde(flatten)]
    pub command: &'a Command,
}

impl OutboundFrame<'_> {
    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
