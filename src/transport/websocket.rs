//! WebSocket transport backed by tokio-tungstenite.
//!
//! [`WebSocketTransport::open`] performs the WebSocket handshake and spawns
//! one task per connection that runs the read/write loop: frames read from
//! the socket are forwarded to the link's incoming channel, items from the
//! outgoing channel are written to the socket.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Incoming, Outgoing, Transport, TransportError, TransportLink, TransportResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates a new WebSocket transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, TransportResult<TransportLink>> {
        Box::pin(async move {
            let (socket, _response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
            let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
            tokio::spawn(run_socket(socket, outgoing_rx, incoming_tx));

            tracing::debug!(url, "websocket open");
            Ok(TransportLink {
                outgoing: outgoing_tx,
                incoming: incoming_rx,
            })
        })
    }
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// Exactly one terminal item ([`Incoming::Closed`] or [`Incoming::Error`])
/// is delivered unless the engine has already dropped its receiver or asked
/// for the close itself.
async fn run_socket(
    socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    incoming: mpsc::UnboundedSender<Incoming>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Frame from the server
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if incoming.send(Incoming::Text(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "websocket closed by peer");
                        let _ = incoming.send(Incoming::Closed);
                        break;
                    }
                    None => {
                        let _ = incoming.send(Incoming::Closed);
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket read failed");
                        let _ = incoming.send(Incoming::Error(TransportError::ReceiveFailed(e.to_string())));
                        break;
                    }
                    // Ping/pong is answered by tungstenite; binary frames are not part of the protocol.
                    Some(Ok(_)) => {}
                }
            }
            // Frame from the engine
            out = outgoing.recv() => {
                match out {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            tracing::warn!(error = %e, "websocket write failed");
                            let _ = incoming.send(Incoming::Error(TransportError::SendFailed(e.to_string())));
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("websocket connection finished");
}
