//! In-process transport.
//!
//! [`InMemoryTransport`] never touches the network. Each successful
//! [`Transport::open`] produces a [`PeerConnection`] on the paired
//! [`InMemoryServer`], from which a test (or an embedding application)
//! plays the server side: push frames, read commands, close the link.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Incoming, Outgoing, Transport, TransportError, TransportLink, TransportResult};

/// Client side of the in-memory transport.
#[derive(Debug)]
pub struct InMemoryTransport {
    accepted: mpsc::UnboundedSender<PeerConnection>,
    fail_next: Mutex<Option<String>>,
}

/// Server side of the in-memory transport.
#[derive(Debug)]
pub struct InMemoryServer {
    accepted: mpsc::UnboundedReceiver<PeerConnection>,
}

impl InMemoryTransport {
    /// Creates a transport and the server that receives its connections.
    #[must_use]
    pub fn new() -> (Self, InMemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted: tx,
                fail_next: Mutex::new(None),
            },
            InMemoryServer { accepted: rx },
        )
    }

    /// Makes the next `open` call fail with the given message.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }
}

impl Transport for InMemoryTransport {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, TransportResult<TransportLink>> {
        Box::pin(async move {
            if let Some(message) = self.fail_next.lock().take() {
                return Err(TransportError::ConnectionFailed(message));
            }

            let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
            let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
            let peer = PeerConnection {
                url: url.to_string(),
                from_client: outgoing_rx,
                to_client: incoming_tx,
            };
            self.accepted
                .send(peer)
                .map_err(|_| TransportError::ConnectionFailed("server dropped".to_string()))?;

            Ok(TransportLink {
                outgoing: outgoing_tx,
                incoming: incoming_rx,
            })
        })
    }
}

impl InMemoryServer {
    /// Waits for the next connection opened by the paired transport.
    pub async fn accept(&mut self) -> Option<PeerConnection> {
        self.accepted.recv().await
    }
}

/// The server end of one in-memory connection.
#[derive(Debug)]
pub struct PeerConnection {
    url: String,
    from_client: mpsc::UnboundedReceiver<Outgoing>,
    to_client: mpsc::UnboundedSender<Incoming>,
}

impl PeerConnection {
    /// URL the client opened.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Pushes a raw text frame to the client.
    ///
    /// Returns `false` if the client side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Incoming::Text(text.into())).is_ok()
    }

    /// Pushes a JSON frame to the client.
    ///
    /// Returns `false` if the client side is gone.
    pub fn send_json(&self, frame: &Value) -> bool {
        self.send_text(frame.to_string())
    }

    /// Reports a clean close to the client.
    pub fn close(&self) {
        let _ = self.to_client.send(Incoming::Closed);
    }

    /// Reports a connection failure to the client.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self
            .to_client
            .send(Incoming::Error(TransportError::ReceiveFailed(message.into())));
    }

    /// Waits for the next item written by the client.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.from_client.recv().await
    }

    /// Waits for the next text frame written by the client, decoded as JSON.
    /// Returns `None` once the client closes or drops the link.
    pub async fn recv_json(&mut self) -> Option<Value> {
        match self.from_client.recv().await? {
            Outgoing::Text(text) => serde_json::from_str(&text).ok(),
            Outgoing::Close => None,
        }
    }

    /// Returns the next item already written by the client, if any.
    pub fn try_recv(&mut self) -> Option<Outgoing> {
        self.from_client.try_recv().ok()
    }
}
