//! Connection lifecycle and the public client handle.
//!
//! [`RtmClient`] sequences the bootstrap (snapshot fetch, mirror population,
//! transport open, handshake wait) and owns everything one connection needs:
//! the [`EntityMirror`], the [`SendCorrelator`], and the subscriber lists.
//!
//! Inbound frames are consumed by a single pump task per connection. Each
//! frame is processed to completion under the session lock (mirror
//! mutation or acknowledgment resolution), then subscribers are notified
//! with the lock released, so handlers may read the mirror.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::api::{ApiClient, HttpSnapshotFetcher, SnapshotFetcher};
use crate::config::ClientConfig;
use crate::domain::{
    Bot, Channel, ChannelId, ChannelRef, DirectMessage, EntityMirror, EventBus, EventStream,
    Group, Team, User,
};
use crate::error::RtmError;
use crate::rtm::{
    Command, EventFilter, EventFrame, Frame, FrameDispatcher, HandlerId, HandlerRegistry,
    Mutation, OutboundFrame, PendingReply, SendCorrelator,
};
use crate::transport::{Incoming, Outgoing, Transport, TransportError, WebSocketTransport};

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection. The mirror is empty.
    Disconnected,
    /// Fetching the snapshot.
    Bootstrapping,
    /// Opening the transport at the snapshot URL.
    OpeningSocket,
    /// Transport open, waiting for `hello`.
    AwaitingHandshake,
    /// Handshake complete. Reads and sends are allowed.
    Connected,
}

impl ConnectionState {
    /// Returns the state as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Bootstrapping => "bootstrapping",
            Self::OpeningSocket => "opening_socket",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Real-time workspace client.
///
/// Every read and [`RtmClient::send`] is gated on
/// [`ConnectionState::Connected`] and fails immediately otherwise.
#[derive(Debug)]
pub struct RtmClient {
    fetcher: Arc<dyn SnapshotFetcher>,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    session: Mutex<Session>,
    handlers: RwLock<HandlerRegistry>,
    event_bus: EventBus,
    dispatcher: FrameDispatcher,
    state: watch::Sender<ConnectionState>,
}

/// Per-connection state. Replaced wholesale by each `connect()`.
#[derive(Debug)]
struct Session {
    state: ConnectionState,
    generation: u64,
    mirror: EntityMirror,
    correlator: SendCorrelator,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    handshake: Option<oneshot::Sender<Result<(), RtmError>>>,
    pump: Option<JoinHandle<()>>,
}

enum Step {
    Continue,
    Notify(EventFrame),
    /// Deliver the event, then tear the session down with the error.
    Reject(EventFrame, RtmError),
    Stop,
}

impl RtmClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn SnapshotFetcher>,
        transport: Arc<dyn Transport>,
        event_bus_capacity: usize,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Shared {
            session: Mutex::new(Session {
                state: ConnectionState::Disconnected,
                generation: 0,
                mirror: EntityMirror::new(),
                correlator: SendCorrelator::new(),
                outgoing: None,
                handshake: None,
                pump: None,
            }),
            handlers: RwLock::new(HandlerRegistry::new()),
            event_bus: EventBus::new(event_bus_capacity),
            dispatcher: FrameDispatcher::new(),
            state,
        };
        Self {
            fetcher,
            transport,
            shared: Arc::new(shared),
        }
    }

    /// Creates a client that bootstraps over HTTP and connects over
    /// WebSocket.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, RtmError> {
        let api = ApiClient::new(config)?;
        Ok(Self::new(
            Arc::new(HttpSnapshotFetcher::new(api)),
            Arc::new(WebSocketTransport::new()),
            config.event_bus_capacity,
        ))
    }

    /// Connects: fetches the snapshot, populates the mirror, opens the
    /// transport, and waits for the handshake.
    ///
    /// A fresh connect resets the command ID counter and rebuilds the
    /// mirror from scratch.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if the client is not
    /// disconnected (code `already_connected`), or if the fetch, the
    /// transport open, or the handshake fails. The client is
    /// [`ConnectionState::Disconnected`] afterwards.
    pub async fn connect(&self) -> Result<(), RtmError> {
        let generation = {
            let mut session = self.shared.session.lock();
            if session.state != ConnectionState::Disconnected {
                return Err(RtmError::Connection {
                    message: format!("connect called while {}", session.state),
                    code: Some("already_connected".to_string()),
                });
            }
            session.generation += 1;
            self.shared
                .transition(&mut session, ConnectionState::Bootstrapping);
            session.generation
        };
        let mut guard = ConnectGuard {
            shared: &self.shared,
            generation,
            armed: true,
        };

        let snapshot = self.fetcher.fetch().await?;
        let url = snapshot.url.clone();
        tracing::debug!(
            users = snapshot.users.len(),
            channels = snapshot.channels.len(),
            groups = snapshot.groups.len(),
            "snapshot fetched"
        );
        {
            let mut session = self.shared.session.lock();
            session.mirror = EntityMirror::from_snapshot(snapshot);
            self.shared
                .transition(&mut session, ConnectionState::OpeningSocket);
        }

        let link = self.transport.open(&url).await?;
        tracing::info!(url = %url, "transport opened");

        let (handshake_tx, handshake_rx) = oneshot::channel();
        {
            let mut session = self.shared.session.lock();
            session.correlator = SendCorrelator::new();
            session.outgoing = Some(link.outgoing);
            session.handshake = Some(handshake_tx);
            self.shared
                .transition(&mut session, ConnectionState::AwaitingHandshake);
            session.pump = Some(tokio::spawn(pump(
                Arc::clone(&self.shared),
                generation,
                link.incoming,
            )));
        }

        handshake_rx
            .await
            .map_err(|_| RtmError::connection_dropped())??;
        guard.disarm();
        tracing::info!("connected");
        Ok(())
    }

    /// Closes the connection and discards the mirror. Pending sends fail
    /// with a connection-dropped error.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if the client is not connected.
    pub fn disconnect(&self) -> Result<(), RtmError> {
        let pump = {
            let mut session = self.shared.session.lock();
            if session.state != ConnectionState::Connected {
                return Err(RtmError::not_connected());
            }
            self.shared
                .teardown(&mut session, RtmError::connection("disconnected"))
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        tracing::info!("disconnected");
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.session.lock().state
    }

    /// Returns `true` once the handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watches lifecycle transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Sends a command and returns its outstanding result.
    ///
    /// Never suspends. The returned [`PendingReply`] resolves when the
    /// matching acknowledgment arrives or the connection goes away.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] without writing anything if the
    /// client is not connected.
    pub fn send(&self, command: Command) -> Result<PendingReply, RtmError> {
        let mut session = self.shared.session.lock();
        if session.state != ConnectionState::Connected {
            return Err(RtmError::not_connected());
        }
        let Some(outgoing) = session.outgoing.clone() else {
            return Err(RtmError::not_connected());
        };

        let id = session.correlator.next_id();
        let text = OutboundFrame {
            id,
            command: &command,
        }
        .to_json()
        .map_err(|e| RtmError::connection(format!("cannot encode command: {e}")))?;
        let reply = session.correlator.track(id);

        // A closed writer is reported by the pump, which fails this reply.
        if outgoing.send(Outgoing::Text(text)).is_err() {
            tracing::debug!(id, "transport writer gone");
        } else {
            tracing::debug!(id, "command sent");
        }
        Ok(reply)
    }

    /// Sends a plain-text message to a conversation.
    ///
    /// # Errors
    ///
    /// See [`RtmClient::send`].
    pub fn send_message(
        &self,
        channel: impl Into<ChannelId>,
        text: impl Into<String>,
    ) -> Result<PendingReply, RtmError> {
        self.send(Command::message(channel, text))
    }

    /// Registers a handler for one event type.
    ///
    /// Handlers run on the frame-processing path after the mirror has been
    /// updated, in frame order, and see every event. They must not block.
    /// A panicking handler is logged and skipped; the connection stays up.
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.shared.handlers.write().on(event_type, Arc::new(handler))
    }

    /// Registers a handler for every event.
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.shared.handlers.write().on_any(Arc::new(handler))
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        self.shared.handlers.write().off(id)
    }

    /// Opens an async stream of events admitted by `filter`.
    ///
    /// Streams are fed after the handlers, through a bounded broadcast
    /// channel. A stream that falls more than the configured capacity
    /// behind loses the oldest events (logged at `warn`); use
    /// [`RtmClient::on`] for lossless delivery.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        self.shared.event_bus.subscribe(filter)
    }

    /// Returns the team.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn team(&self) -> Result<Team, RtmError> {
        self.with_mirror(|m| m.team().cloned())
    }

    /// Returns the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn self_user(&self) -> Result<User, RtmError> {
        self.with_mirror(|m| m.self_user().cloned())
    }

    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown ID.
    pub fn user(&self, id: &str) -> Result<User, RtmError> {
        self.with_mirror(|m| m.users().get(id).cloned())
    }

    /// Lists all users.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn users(&self) -> Result<Vec<User>, RtmError> {
        self.with_mirror(|m| Ok(m.users().list()))
    }

    /// Looks up a public channel.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown ID.
    pub fn channel(&self, id: &str) -> Result<Channel, RtmError> {
        self.with_mirror(|m| m.channels().get(id).cloned())
    }

    /// Lists all public channels.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn channels(&self) -> Result<Vec<Channel>, RtmError> {
        self.with_mirror(|m| Ok(m.channels().list()))
    }

    /// Looks up a private channel.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown ID.
    pub fn group(&self, id: &str) -> Result<Group, RtmError> {
        self.with_mirror(|m| m.groups().get(id).cloned())
    }

    /// Lists all private channels.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn groups(&self) -> Result<Vec<Group>, RtmError> {
        self.with_mirror(|m| Ok(m.groups().list()))
    }

    /// Looks up a DM session.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown ID.
    pub fn dm(&self, id: &str) -> Result<DirectMessage, RtmError> {
        self.with_mirror(|m| m.dms().get(id).cloned())
    }

    /// Lists all DM sessions.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn dms(&self) -> Result<Vec<DirectMessage>, RtmError> {
        self.with_mirror(|m| Ok(m.dms().list()))
    }

    /// Looks up a bot.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown ID.
    pub fn bot(&self, id: &str) -> Result<Bot, RtmError> {
        self.with_mirror(|m| m.bots().get(id).cloned())
    }

    /// Lists all bots.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn bots(&self) -> Result<Vec<Bot>, RtmError> {
        self.with_mirror(|m| Ok(m.bots().list()))
    }

    /// Resolves any conversation ID by prefix.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown ID.
    pub fn any_channel(&self, id: &str) -> Result<ChannelRef, RtmError> {
        self.with_mirror(|m| m.any_channel(id))
    }

    /// Resolves the members of a channel or group to users.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] for an unknown channel.
    pub fn channel_members(&self, id: &str) -> Result<Vec<User>, RtmError> {
        self.with_mirror(|m| m.channel_members(id))
    }

    /// Finds the DM session with the given user.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected and
    /// [`RtmError::NotFound`] if there is no such session.
    pub fn dm_with_user(&self, user_id: &str) -> Result<DirectMessage, RtmError> {
        self.with_mirror(|m| m.dm_with_user(user_id).cloned())
    }

    /// Returns a point-in-time copy of the whole mirror.
    ///
    /// # Errors
    ///
    /// Returns a [`RtmError::Connection`] if not connected.
    pub fn mirror(&self) -> Result<EntityMirror, RtmError> {
        self.with_mirror(|m| Ok(m.clone()))
    }

    fn with_mirror<T>(
        &self,
        read: impl FnOnce(&EntityMirror) -> Result<T, RtmError>,
    ) -> Result<T, RtmError> {
        let session = self.shared.session.lock();
        if session.state != ConnectionState::Connected {
            return Err(RtmError::not_connected());
        }
        read(&session.mirror)
    }
}

impl Drop for RtmClient {
    fn drop(&mut self) {
        let pump = {
            let mut session = self.shared.session.lock();
            if session.state == ConnectionState::Disconnected {
                return;
            }
            self.shared
                .teardown(&mut session, RtmError::connection("client dropped"))
        };
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

impl Shared {
    fn transition(&self, session: &mut Session, next: ConnectionState) {
        tracing::debug!(from = %session.state, to = %next, "connection state");
        session.state = next;
        self.state.send_replace(next);
    }

    /// Returns the session to `Disconnected`, failing everything that was
    /// waiting on it. The pump handle is handed back for the caller to
    /// abort (or drop, when the pump itself is tearing down).
    fn teardown(&self, session: &mut Session, cause: RtmError) -> Option<JoinHandle<()>> {
        if let Some(outgoing) = session.outgoing.take() {
            let _ = outgoing.send(Outgoing::Close);
        }
        if let Some(handshake) = session.handshake.take() {
            let _ = handshake.send(Err(cause));
        }
        let failed = session
            .correlator
            .fail_all(&RtmError::connection_dropped());
        if failed > 0 {
            tracing::info!(failed, "pending sends failed");
        }
        session.correlator = SendCorrelator::new();
        session.mirror = EntityMirror::new();
        self.transition(session, ConnectionState::Disconnected);
        session.pump.take()
    }

    fn process_text(&self, generation: u64, text: &str) -> Step {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                return Step::Continue;
            }
        };

        let mut session = self.session.lock();
        if session.generation != generation || session.state == ConnectionState::Disconnected {
            return Step::Stop;
        }

        match frame {
            Frame::Ignored => Step::Continue,
            Frame::Ack(ack) => {
                session.correlator.resolve(&ack);
                Step::Continue
            }
            Frame::Event(event) => {
                if session.state == ConnectionState::AwaitingHandshake
                    && event.event_type() == "error"
                {
                    let err = handshake_error(&event);
                    tracing::warn!(error = %err, "handshake rejected");
                    return Step::Reject(event, err);
                }

                match self.dispatcher.apply(&mut session.mirror, &event) {
                    Ok(Mutation::HandshakeComplete) => {
                        if session.state == ConnectionState::AwaitingHandshake {
                            self.transition(&mut session, ConnectionState::Connected);
                            if let Some(handshake) = session.handshake.take() {
                                let _ = handshake.send(Ok(()));
                            }
                        }
                    }
                    Ok(Mutation::Applied | Mutation::Unchanged) => {}
                    Err(e) => {
                        tracing::warn!(
                            event_type = event.event_type(),
                            error = %e,
                            "event not applied to mirror"
                        );
                    }
                }
                Step::Notify(event)
            }
        }
    }

    fn notify(&self, event: EventFrame) {
        let handlers = self.handlers.read().handlers_for(event.event_type());
        for handler in &handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(event_type = event.event_type(), "event handler panicked");
            }
        }
        self.event_bus.publish(event);
    }

    fn connection_lost(&self, generation: u64, cause: RtmError) {
        let mut session = self.session.lock();
        if session.generation != generation || session.state == ConnectionState::Disconnected {
            return;
        }
        tracing::warn!(error = %cause, state = %session.state, "connection lost");
        let _ = self.teardown(&mut session, cause);
    }
}

async fn pump(
    shared: Arc<Shared>,
    generation: u64,
    mut incoming: mpsc::UnboundedReceiver<Incoming>,
) {
    while let Some(item) = incoming.recv().await {
        match item {
            Incoming::Text(text) => match shared.process_text(generation, &text) {
                Step::Continue => {}
                Step::Notify(event) => shared.notify(event),
                Step::Reject(event, cause) => {
                    shared.notify(event);
                    shared.connection_lost(generation, cause);
                    return;
                }
                Step::Stop => return,
            },
            Incoming::Closed => {
                shared.connection_lost(
                    generation,
                    RtmError::Connection {
                        message: "connection closed by server".to_string(),
                        code: Some("connection_closed".to_string()),
                    },
                );
                return;
            }
            Incoming::Error(e) => {
                shared.connection_lost(generation, e.into());
                return;
            }
        }
    }
    shared.connection_lost(generation, TransportError::ConnectionClosed.into());
}

// `{"type": "error", "error": {"code": 1, "msg": "Socket URL has expired"}}`
fn handshake_error(event: &EventFrame) -> RtmError {
    let detail = event.get("error");
    let message = detail
        .and_then(|e| e.get("msg"))
        .and_then(Value::as_str)
        .unwrap_or("handshake failed")
        .to_string();
    let code = detail.and_then(|e| e.get("code")).and_then(|c| match c {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    RtmError::Connection { message, code }
}

/// Tears the session down if `connect()` fails or is cancelled before the
/// handshake completes.
struct ConnectGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl ConnectGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let pump = {
            let mut session = self.shared.session.lock();
            if session.generation != self.generation
                || matches!(
                    session.state,
                    ConnectionState::Disconnected | ConnectionState::Connected
                )
            {
                return;
            }
            self.shared
                .teardown(&mut session, RtmError::connection("connect aborted"))
        };
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::api::StaticSnapshot;
    use crate::error::{EntityKind, ErrorKind};
    use crate::transport::{InMemoryServer, InMemoryTransport, PeerConnection};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready, task};

    fn workspace() -> Value {
        json!({
            "ok": true,
            "url": "mem://rtm",
            "team": {"id": "T1", "name": "Acme", "domain": "acme"},
            "self": {"id": "U1", "name": "me"},
            "users": [
                {"id": "U1", "name": "me"},
                {"id": "U2", "name": "alice"},
                {"id": "U3", "name": "bob"}
            ],
            "channels": [
                {"id": "C1", "name": "general", "members": ["U1", "U2", "U9"]},
                {"id": "C2", "name": "random"}
            ],
            "groups": [{"id": "G1", "name": "secret"}],
            "ims": [{"id": "D1", "user": "U2", "created": 1_700_000_000}],
            "bots": [{"id": "B1", "name": "helper"}]
        })
    }

    fn client_for(body: Value) -> (Arc<RtmClient>, Arc<InMemoryTransport>, InMemoryServer) {
        let (transport, server) = InMemoryTransport::new();
        let transport = Arc::new(transport);
        let dyn_transport: Arc<dyn Transport> = Arc::clone(&transport) as Arc<dyn Transport>;
        let client = RtmClient::new(Arc::new(StaticSnapshot::new(body)), dyn_transport, 64);
        (Arc::new(client), transport, server)
    }

    fn start_connect(client: &Arc<RtmClient>) -> JoinHandle<Result<(), RtmError>> {
        let client = Arc::clone(client);
        tokio::spawn(async move { client.connect().await })
    }

    async fn connected(
        body: Value,
    ) -> (Arc<RtmClient>, PeerConnection, Arc<InMemoryTransport>, InMemoryServer) {
        let (client, transport, mut server) = client_for(body);
        let connecting = start_connect(&client);
        let Some(peer) = server.accept().await else {
            panic!("client opens the transport");
        };
        assert!(peer.send_json(&json!({"type": "hello"})));
        let Ok(Ok(())) = connecting.await else {
            panic!("connect completes after hello");
        };
        (client, peer, transport, server)
    }

    // Waits until the pump has processed everything pushed before the marker.
    async fn flush(peer: &PeerConnection, stream: &mut EventStream) {
        assert!(peer.send_json(&json!({"type": "test_marker"})));
        loop {
            let Some(event) = stream.recv().await else {
                panic!("event stream closed");
            };
            if event.event_type() == "test_marker" {
                return;
            }
        }
    }

    #[tokio::test]
    async fn lists_match_snapshot_counts() {
        let (client, _peer, _t, _s) = connected(workspace()).await;
        assert!(client.is_connected());

        let Ok(users) = client.users() else {
            panic!("connected read");
        };
        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["U1", "U2", "U3"]);

        let Ok(channels) = client.channels() else {
            panic!("connected read");
        };
        let ids: Vec<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2"]);
        assert!(matches!(client.groups(), Ok(g) if g.len() == 1));
        assert!(matches!(client.dms(), Ok(d) if d.len() == 1));
        assert!(matches!(client.bots(), Ok(b) if b.len() == 1));
    }

    #[tokio::test]
    async fn minimal_snapshot_lookups() {
        let (client, _peer, _t, _s) = connected(json!({
            "ok": true,
            "url": "mem://rtm",
            "team": {"id": "T1"},
            "users": [{"id": "U1"}],
            "channels": [{"id": "C1"}],
            "groups": [],
            "ims": []
        }))
        .await;

        let Ok(team) = client.team() else {
            panic!("team present");
        };
        assert_eq!(team.id.as_str(), "T1");
        assert!(client.user("U1").is_ok());
        let Ok(me) = client.self_user() else {
            panic!("self entry present");
        };
        assert_eq!(me.id.as_str(), "U1");

        let Err(err) = client.channel("C2") else {
            panic!("C2 is not mirrored");
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err, RtmError::not_found(EntityKind::Channel, "C2"));
    }

    #[tokio::test]
    async fn derived_lookups() {
        let (client, _peer, _t, _s) = connected(workspace()).await;

        let Ok(members) = client.channel_members("C1") else {
            panic!("C1 exists");
        };
        let names: Vec<&str> = members.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["me", "alice"]);

        assert!(matches!(client.any_channel("G1"), Ok(ChannelRef::Group(_))));
        assert!(matches!(
            client.any_channel("D1"),
            Ok(ChannelRef::DirectMessage(_))
        ));
        let Ok(dm) = client.dm_with_user("U2") else {
            panic!("DM with U2 exists");
        };
        assert_eq!(dm.id.as_str(), "D1");
    }

    #[tokio::test]
    async fn reads_fail_when_disconnected() {
        let (client, _t, _s) = client_for(workspace());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        for result in [
            client.team().map(|_| ()),
            client.users().map(|_| ()),
            client.channel("C1").map(|_| ()),
            client.mirror().map(|_| ()),
        ] {
            let Err(err) = result else {
                panic!("read must fail while disconnected");
            };
            assert_eq!(err.kind(), ErrorKind::Connection);
        }
    }

    #[tokio::test]
    async fn send_before_handshake_fails_without_write() {
        let (client, _t, mut server) = client_for(workspace());
        let connecting = start_connect(&client);
        let Some(mut peer) = server.accept().await else {
            panic!("client opens the transport");
        };
        assert_eq!(client.state(), ConnectionState::AwaitingHandshake);

        let Err(err) = client.send_message("C1", "too early") else {
            panic!("send must fail before the handshake");
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(client.channels().is_err());
        assert!(peer.try_recv().is_none());

        peer.send_json(&json!({"type": "hello"}));
        let Ok(Ok(())) = connecting.await else {
            panic!("connect completes");
        };
    }

    #[tokio::test]
    async fn ids_increase_and_acks_resolve() {
        let (client, mut peer, _t, _s) = connected(workspace()).await;

        let Ok(first) = client.send_message("C1", "hi") else {
            panic!("connected send");
        };
        let Ok(second) = client.send_message("C1", "again") else {
            panic!("connected send");
        };
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);

        assert_eq!(
            peer.recv_json().await,
            Some(json!({"id": 1, "type": "message", "channel": "C1", "text": "hi"}))
        );
        assert_eq!(
            peer.recv_json().await,
            Some(json!({"id": 2, "type": "message", "channel": "C1", "text": "again"}))
        );

        peer.send_json(&json!({"reply_to": 1, "ok": true}));
        peer.send_json(&json!({"reply_to": 2, "ok": false, "error": "x"}));
        assert_eq!(first.await, Ok(()));
        let Err(err) = second.await else {
            panic!("negative ack fails the send");
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.code(), Some("x"));
    }

    #[tokio::test]
    async fn unknown_reply_to_resolves_nothing() {
        let (client, peer, _t, _s) = connected(workspace()).await;
        let mut stream = client.subscribe(EventFilter::from_types(["test_marker"]));
        let Ok(reply) = client.send(Command::Ping) else {
            panic!("connected send");
        };
        let mut reply = task::spawn(reply);

        peer.send_json(&json!({"reply_to": 99, "ok": true}));
        flush(&peer, &mut stream).await;
        assert_pending!(reply.poll());

        peer.send_json(&json!({"reply_to": 1, "ok": true}));
        flush(&peer, &mut stream).await;
        assert_eq!(assert_ready!(reply.poll()), Ok(()));
    }

    #[tokio::test]
    async fn channel_archive_mutates_then_notifies() {
        let (client, peer, _t, _s) = connected(workspace()).await;
        let mut stream = client.subscribe(EventFilter::from_types(["channel_archive"]));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        client.on("channel_archive", move |event| {
            assert_eq!(event.str_field("channel"), Some("C1"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..2 {
            peer.send_json(&json!({"type": "channel_archive", "channel": "C1", "user": "U2"}));
            let Some(event) = stream.recv().await else {
                panic!("archive event delivered");
            };
            assert_eq!(event.str_field("channel"), Some("C1"));
            let Ok(channel) = client.channel("C1") else {
                panic!("C1 exists");
            };
            assert!(channel.is_archived);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_events_reach_catch_all_and_acks_do_not() {
        let (client, peer, _t, _s) = connected(workspace()).await;
        let mut stream = client.subscribe(EventFilter::from_types(["test_marker"]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let handler = client.on_any(move |event| log.lock().push(event.event_type().to_string()));

        peer.send_json(&json!({"type": "reaction_added", "reaction": "+1"}));
        peer.send_json(&json!({"reply_to": 7, "ok": true}));
        flush(&peer, &mut stream).await;

        assert_eq!(*seen.lock(), vec!["reaction_added", "test_marker"]);
        assert!(client.off(handler));
    }

    #[tokio::test]
    async fn disconnect_fails_pending_sends() {
        let (client, mut peer, _t, _s) = connected(workspace()).await;
        let Ok(reply) = client.send_message("C1", "hi") else {
            panic!("connected send");
        };
        assert!(peer.recv_json().await.is_some());

        assert!(client.disconnect().is_ok());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(peer.recv().await, Some(Outgoing::Close));

        let Err(err) = reply.await else {
            panic!("pending send fails on disconnect");
        };
        assert_eq!(err, RtmError::connection_dropped());
        assert!(client.users().is_err());
        assert!(client.send(Command::Ping).is_err());
    }

    #[tokio::test]
    async fn disconnect_requires_connected() {
        let (client, _t, _s) = client_for(workspace());
        let Err(err) = client.disconnect() else {
            panic!("disconnect must fail while disconnected");
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn connect_while_connected_fails_fast() {
        let (client, _peer, _t, _s) = connected(workspace()).await;
        let Err(err) = client.connect().await else {
            panic!("second connect must fail");
        };
        assert_eq!(err.code(), Some("already_connected"));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn handshake_error_fails_connect() {
        let (client, _t, mut server) = client_for(workspace());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        client.on_any(move |event| log.lock().push(event.event_type().to_string()));
        let connecting = start_connect(&client);
        let Some(peer) = server.accept().await else {
            panic!("client opens the transport");
        };
        peer.send_json(&json!({
            "type": "error",
            "error": {"code": 1, "msg": "Socket URL has expired"}
        }));

        let Ok(Err(err)) = connecting.await else {
            panic!("connect must fail");
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.code(), Some("1"));
        assert!(err.to_string().contains("Socket URL has expired"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(*seen.lock(), vec!["error"]);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stall_the_connection() {
        let (client, mut peer, _t, _s) = connected(workspace()).await;
        let mut stream = client.subscribe(EventFilter::from_types(["boom"]));
        client.on("boom", |_| panic!("handler failure"));

        peer.send_json(&json!({"type": "boom"}));
        let Some(event) = stream.recv().await else {
            panic!("event still reaches streams");
        };
        assert_eq!(event.event_type(), "boom");
        assert!(client.is_connected());

        let Ok(reply) = client.send_message("C1", "hi") else {
            panic!("connected send");
        };
        assert!(peer.recv_json().await.is_some());
        peer.send_json(&json!({"reply_to": 1, "ok": true}));
        assert_eq!(reply.await, Ok(()));
    }

    #[tokio::test]
    async fn server_close_tears_down() {
        let (client, mut peer, _t, _s) = connected(workspace()).await;
        let mut state = client.watch_state();
        let Ok(reply) = client.send_message("C1", "hi") else {
            panic!("connected send");
        };
        assert!(peer.recv_json().await.is_some());

        peer.close();
        let Ok(_) = state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
        else {
            panic!("state channel open");
        };
        let Err(err) = reply.await else {
            panic!("pending send fails on close");
        };
        assert_eq!(err, RtmError::connection_dropped());
        assert!(client.channels().is_err());
    }

    #[tokio::test]
    async fn server_close_during_handshake_fails_connect() {
        let (client, _t, mut server) = client_for(workspace());
        let connecting = start_connect(&client);
        let Some(peer) = server.accept().await else {
            panic!("client opens the transport");
        };
        peer.close();

        let Ok(Err(err)) = connecting.await else {
            panic!("connect must fail");
        };
        assert_eq!(err.code(), Some("connection_closed"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn transport_loss_tears_down() {
        let (client, mut peer, _t, _s) = connected(workspace()).await;
        let mut state = client.watch_state();
        let Ok(reply) = client.send(Command::typing("C1")) else {
            panic!("connected send");
        };
        assert_eq!(
            peer.recv_json().await,
            Some(json!({"id": 1, "type": "typing", "channel": "C1"}))
        );

        peer.fail("connection reset");
        let Ok(_) = state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
        else {
            panic!("state channel open");
        };
        let Err(err) = reply.await else {
            panic!("pending send fails on loss");
        };
        assert_eq!(err.code(), Some("connection_dropped"));
        assert!(client.team().is_err());
    }

    #[tokio::test]
    async fn fetch_failure_aborts_connect() {
        let (client, _t, _s) = client_for(json!({"ok": false, "error": "invalid_auth"}));
        let Err(err) = client.connect().await else {
            panic!("rejected bootstrap must fail connect");
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.code(), Some("invalid_auth"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn open_failure_then_fresh_connect() {
        let (client, transport, mut server) = client_for(workspace());
        transport.fail_next_open("refused");
        let Err(err) = client.connect().await else {
            panic!("open failure must fail connect");
        };
        assert!(err.to_string().contains("refused"));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let connecting = start_connect(&client);
        let Some(mut peer) = server.accept().await else {
            panic!("second attempt opens the transport");
        };
        peer.send_json(&json!({"type": "hello"}));
        let Ok(Ok(())) = connecting.await else {
            panic!("second connect succeeds");
        };
        let Ok(reply) = client.send(Command::Ping) else {
            panic!("connected send");
        };
        assert_eq!(reply.id(), 1);
        assert_eq!(peer.recv_json().await, Some(json!({"id": 1, "type": "ping"})));
    }

    #[tokio::test]
    async fn reconnect_resets_ids_and_mirror() {
        let (client, mut peer, _t, mut server) = connected(workspace()).await;
        let mut stream = client.subscribe(EventFilter::from_types(["test_marker"]));
        peer.send_json(&json!({"type": "channel_deleted", "channel": "C2"}));
        flush(&peer, &mut stream).await;
        assert!(client.channel("C2").is_err());
        let Ok(_first) = client.send(Command::Ping) else {
            panic!("connected send");
        };
        assert!(peer.recv_json().await.is_some());
        assert!(client.disconnect().is_ok());

        let connecting = start_connect(&client);
        let Some(peer) = server.accept().await else {
            panic!("reconnect opens the transport");
        };
        peer.send_json(&json!({"type": "hello"}));
        let Ok(Ok(())) = connecting.await else {
            panic!("reconnect succeeds");
        };
        assert!(client.channel("C2").is_ok());
        let Ok(reply) = client.send(Command::Ping) else {
            panic!("connected send");
        };
        assert_eq!(reply.id(), 1);
    }

    #[test]
    fn state_display() {
        assert_eq!(
            ConnectionState::AwaitingHandshake.to_string(),
            "awaiting_handshake"
        );
    }
}
