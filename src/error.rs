//! Client error types with kind classification.
//!
//! [`RtmError`] is the central error type for the client. Every variant
//! belongs to exactly one [`ErrorKind`], which is what callers should match
//! on when deciding how to react:
//!
//! | Kind         | Raised by                                   | Surfaces     |
//! |--------------|---------------------------------------------|--------------|
//! | `Connection` | lifecycle, transport, snapshot fetch, reads | immediately  |
//! | `Protocol`   | server acknowledgment with `ok: false`      | via `send()` |
//! | `NotFound`   | mirror lookup by unknown ID                 | immediately  |

use std::fmt;

use crate::api::ApiError;
use crate::transport::TransportError;

/// Entity category used to scope not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The workspace team.
    Team,
    /// A workspace member.
    User,
    /// A public channel.
    Channel,
    /// A private channel.
    Group,
    /// A direct-message session.
    DirectMessage,
    /// An integration bot.
    Bot,
}

impl EntityKind {
    /// Returns the category as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::User => "user",
            Self::Channel => "channel",
            Self::Group => "group",
            Self::DirectMessage => "dm",
            Self::Bot => "bot",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an [`RtmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not connected, transport failure, handshake failure, fetch failure.
    Connection,
    /// The server rejected a command.
    Protocol,
    /// Lookup by an ID that is not in the mirror.
    NotFound,
}

/// Client-side error enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RtmError {
    /// The connection is unavailable or could not be established.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable cause.
        message: String,
        /// Server or transport supplied code, when one exists.
        code: Option<String>,
    },

    /// The server answered a command with `ok: false`.
    #[error("command rejected by server: {code}")]
    Protocol {
        /// Server supplied error code (e.g. `"channel_not_found"`).
        code: String,
        /// Optional server supplied description.
        message: Option<String>,
    },

    /// No entity with the given ID exists in the given category.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Category that was searched.
        kind: EntityKind,
        /// The ID that was looked up.
        id: String,
    },
}

impl RtmError {
    /// Builds a connection error without a code.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            code: None,
        }
    }

    /// The error returned by every gated operation while disconnected.
    #[must_use]
    pub fn not_connected() -> Self {
        Self::connection("client not connected")
    }

    /// The error used to fail pending sends when the connection goes away.
    #[must_use]
    pub fn connection_dropped() -> Self {
        Self::Connection {
            message: "connection dropped before acknowledgment".to_string(),
            code: Some("connection_dropped".to_string()),
        }
    }

    /// Builds a not-found error for the given category.
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Returns the machine-readable code carried by the error, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Connection { code, .. } => code.as_deref(),
            Self::Protocol { code, .. } => Some(code),
            Self::NotFound { .. } => None,
        }
    }
}

/// Failure to decode an inbound frame or an entity inside it.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The text is not valid JSON.
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON value is not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A field required by the event or snapshot is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// An embedded entity does not have the expected shape.
    #[error("invalid {kind} payload: {source}")]
    InvalidEntity {
        /// Category being decoded.
        kind: EntityKind,
        /// Underlying decoding error.
        source: serde_json::Error,
    },

    /// An embedded entity carries an empty ID.
    #[error("{0} payload has an empty id")]
    EmptyId(EntityKind),
}

impl From<FrameError> for RtmError {
    fn from(err: FrameError) -> Self {
        Self::Connection {
            message: format!("invalid snapshot: {err}"),
            code: Some("invalid_snapshot".to_string()),
        }
    }
}

impl From<TransportError> for RtmError {
    fn from(err: TransportError) -> Self {
        Self::Connection {
            message: err.to_string(),
            code: None,
        }
    }
}

impl From<ApiError> for RtmError {
    fn from(err: ApiError) -> Self {
        let code = match &err {
            ApiError::Rejected { code, .. } => Some(code.clone()),
            ApiError::Http(_) | ApiError::InvalidUrl(_) | ApiError::Decode(_) => None,
        };
        Self::Connection {
            message: err.to_string(),
            code,
        }
    }
}
