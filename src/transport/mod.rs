//! Transport adapter layer.
//!
//! A [`Transport`] opens a persistent, message-oriented connection and hands
//! back a [`TransportLink`]: an ordered stream of [`Incoming`] items and a
//! sink for [`Outgoing`] items. Two implementations ship with the crate:
//!
//! - [`WebSocketTransport`] for real connections (tokio-tungstenite)
//! - [`InMemoryTransport`] for tests and offline use

pub mod memory;
pub mod websocket;

pub use memory::{InMemoryServer, InMemoryTransport, PeerConnection};
pub use websocket::WebSocketTransport;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Item delivered by the transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame.
    Text(String),
    /// The peer closed the connection. Nothing follows.
    Closed,
    /// The connection failed. Nothing follows.
    Error(TransportError),
}

/// Item handed to the transport for writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A text frame.
    Text(String),
    /// Close the connection.
    Close,
}

/// Both directions of an open connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to write. Writing never blocks the caller.
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    /// Frames read, in arrival order.
    pub incoming: mpsc::UnboundedReceiver<Incoming>,
}

/// Opens connections to transport URLs.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Opens a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the connection cannot
    /// be established.
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, TransportResult<TransportLink>>;
}
