//! The realtime connection: one per process, shared by every view.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views register handlers and emit events through a [`Connection`] handle.
//! A driver task owns the transport: it performs the Engine.IO/Socket.IO
//! handshake, answers heartbeats, dispatches inbound events to handlers, and
//! drains the outbound queue while connected.
//!
//! LIFECYCLE
//! =========
//! `Connecting -> Connected -> Reconnecting -> Connected ...` until either the
//! reconnection budget runs out (the `on_reconnect_failed` callback fires), the
//! server sends a namespace disconnect, or [`Connection::disconnect`] is
//! called. Every successful connect announces the session's user id with
//! `user-login`, re-joins the tracking rooms held by open subscriptions, then
//! flushes events queued while offline.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here is surfaced to callers. Transport failures are logged and
//! retried; undecodable frames and malformed payloads are logged and skipped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use wire::events::{CONNECTION_CONFIRMED, ConnectionConfirmed, OutboundEvent, SYSTEM_ANNOUNCEMENT, UserLogin};
use wire::{EnginePacket, Handshake, SocketPacket};

use super::backoff::Backoff;
use super::listeners::{Handler, ListenerId, ListenerRegistry};
use super::transport::{Connector, TransportLink, WebSocketConnector, websocket_url};
use crate::config::ClientConfig;
use crate::session::{self, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid realtime url: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    WsConnect(#[source] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("transport closed")]
    Closed,
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("no heartbeat from server")]
    HeartbeatTimeout,
    #[error("connection refused by server: {0}")]
    Rejected(String),
    #[error("unexpected packet during handshake: {0}")]
    UnexpectedPacket(String),
    #[error(transparent)]
    Codec(#[from] wire::CodecError),
}

/// Transport state as seen by views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Reconnecting,
}

type ReconnectFailedCallback = Arc<dyn Fn() + Send + Sync>;

enum Outgoing {
    Event { name: &'static str, data: Value },
    /// Acknowledged once every earlier event has been handed to the transport.
    Flush(oneshot::Sender<()>),
}

/// State shared between handles and the driver task.
struct Shared {
    config: ClientConfig,
    session: Arc<SessionStore>,
    listeners: Mutex<ListenerRegistry>,
    /// Open tracking subscriptions per parcel id.
    rooms: Mutex<HashMap<String, usize>>,
    state: watch::Sender<TransportState>,
    socket_id: Mutex<Option<String>>,
    on_reconnect_failed: Mutex<Option<ReconnectFailedCallback>>,
}

/// Owned by handles only; dropping the last handle stops the driver.
struct Control {
    outbound: mpsc::UnboundedSender<Outgoing>,
    shutdown: watch::Sender<bool>,
}

/// Cheap, cloneable handle to a realtime connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    control: Arc<Control>,
}

/// The process-wide connection, created and started on first call.
///
/// The first call must happen inside the Tokio runtime that outlives the
/// connection; without a runtime the connection is created but stays
/// disconnected.
///
/// [`Connection::disconnect`] is final for this handle: after logout it stays
/// disconnected for the rest of the process. Code that needs a fresh session
/// in the same process builds its own with [`Connection::new`].
pub fn get_connection() -> &'static Connection {
    static CONNECTION: OnceLock<Connection> = OnceLock::new();
    CONNECTION.get_or_init(|| {
        Connection::new(
            ClientConfig::from_env(),
            session::store(),
            Arc::new(WebSocketConnector),
        )
    })
}

impl Connection {
    /// Create a connection and spawn its driver on the current runtime.
    #[must_use]
    pub fn new(config: ClientConfig, session: Arc<SessionStore>, connector: Arc<dyn Connector>) -> Self {
        let (connection, outbound, shutdown) = Self::unstarted(config, session);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(drive(Arc::clone(&connection.shared), connector, outbound, shutdown));
            }
            Err(_) => {
                tracing::error!("no tokio runtime; realtime connection stays offline");
            }
        }
        connection
    }

    fn unstarted(
        config: ClientConfig,
        session: Arc<SessionStore>,
    ) -> (Self, mpsc::UnboundedReceiver<Outgoing>, watch::Receiver<bool>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state, _) = watch::channel(TransportState::Disconnected);

        let connection = Self {
            shared: Arc::new(Shared {
                config,
                session,
                listeners: Mutex::new(ListenerRegistry::default()),
                rooms: Mutex::new(HashMap::new()),
                state,
                socket_id: Mutex::new(None),
                on_reconnect_failed: Mutex::new(None),
            }),
            control: Arc::new(Control {
                outbound: outbound_tx,
                shutdown: shutdown_tx,
            }),
        };
        connection.install_default_listeners();
        (connection, outbound_rx, shutdown_rx)
    }

    fn install_default_listeners(&self) {
        self.on(CONNECTION_CONFIRMED, |data| {
            match serde_json::from_value::<ConnectionConfirmed>(data.clone()) {
                Ok(confirmed) => tracing::info!(socket_id = %confirmed.socket_id, "connection confirmed"),
                Err(e) => tracing::debug!(error = %e, "unparsed connection-confirmed payload"),
            }
        });
        self.on(SYSTEM_ANNOUNCEMENT, |data| {
            let message = data.get("message").and_then(Value::as_str).unwrap_or_default();
            tracing::info!(%message, "system announcement");
        });
    }

    /// Whether two handles refer to the same connection.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.shared.session
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.shared.state.subscribe()
    }

    /// Server-assigned socket id; present only while connected.
    #[must_use]
    pub fn socket_id(&self) -> Option<String> {
        self.shared
            .socket_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    /// Register `handler` for inbound `event`.
    pub fn on(&self, event: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.shared.listeners().add(event, Arc::new(handler))
    }

    /// Remove exactly the handler registered as `id`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.shared.listeners().remove(event, id)
    }

    /// Register `handler` for `event` until the returned guard is dropped.
    pub fn listen(&self, event: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> Listener {
        let id = self.on(event, handler);
        Listener {
            connection: self.clone(),
            event: event.to_owned(),
            id,
        }
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.listeners().count(event)
    }

    /// Invoke every handler registered for `event`, in registration order.
    pub(crate) fn dispatch(&self, event: &str, data: &Value) {
        self.shared.dispatch(event, data);
    }

    /// Called once the connection gives up reconnecting.
    pub fn on_reconnect_failed(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self
            .shared
            .on_reconnect_failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Queue an event for the server. Delivered once connected; never fails.
    pub fn emit(&self, event: &OutboundEvent) {
        let name = event.name();
        let data = match event.to_data() {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(event = name, error = %e, "dropping unserializable event");
                return;
            }
        };
        if self.control.outbound.send(Outgoing::Event { name, data }).is_err() {
            tracing::debug!(event = name, "realtime connection closed; event dropped");
        }
    }

    /// Wait until every event emitted so far has been handed to a connected
    /// transport. Returns `false` if the connection stopped first; never
    /// completes while the connection keeps retrying, so callers bound it
    /// with a timeout.
    pub async fn flush(&self) -> bool {
        let (done, acked) = oneshot::channel();
        if self.control.outbound.send(Outgoing::Flush(done)).is_err() {
            return false;
        }
        acked.await.is_ok()
    }

    /// Close the transport and stop reconnecting. The handle cannot be
    /// restarted; later emits are dropped.
    pub fn disconnect(&self) {
        self.control.shutdown.send_replace(true);
    }

    // =========================================================================
    // ROOMS
    // =========================================================================

    pub(crate) fn retain_room(&self, parcel_id: &str) {
        *self.shared.rooms().entry(parcel_id.to_owned()).or_default() += 1;
    }

    /// Drop one hold on `parcel_id`'s room. Returns `true` when it was the last.
    pub(crate) fn release_room(&self, parcel_id: &str) -> bool {
        let mut rooms = self.shared.rooms();
        let Some(count) = rooms.get_mut(parcel_id) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return false;
        }
        rooms.remove(parcel_id);
        true
    }

    /// Parcels with at least one open tracking subscription.
    #[must_use]
    pub fn tracked_parcels(&self) -> Vec<String> {
        self.shared.tracked_parcels()
    }
}

impl Shared {
    fn listeners(&self) -> std::sync::MutexGuard<'_, ListenerRegistry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rooms(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracked_parcels(&self) -> Vec<String> {
        let mut parcels: Vec<String> = self.rooms().keys().cloned().collect();
        parcels.sort();
        parcels
    }

    fn dispatch(&self, event: &str, data: &Value) {
        // Handlers may register or drop listeners, so the lock is released first.
        let handlers: Vec<Handler> = self.listeners().handlers(event);
        if handlers.is_empty() {
            tracing::trace!(event, "no handlers");
        }
        for handler in handlers {
            handler(data);
        }
    }

    fn set_state(&self, state: TransportState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "transport state");
        }
    }

    fn set_socket_id(&self, socket_id: Option<String>) {
        *self.socket_id.lock().unwrap_or_else(PoisonError::into_inner) = socket_id;
    }

    fn reconnect_failed_callback(&self) -> Option<ReconnectFailedCallback> {
        self.on_reconnect_failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handler registration that is removed on drop.
pub struct Listener {
    connection: Connection,
    event: String,
    id: ListenerId,
}

impl Listener {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.connection.off(&self.event, self.id);
    }
}

// =============================================================================
// DRIVER
// =============================================================================

enum SessionEnd {
    /// `disconnect()` was called or every handle was dropped.
    Shutdown,
    /// Server sent a namespace disconnect; do not reconnect.
    ServerDisconnect,
    /// Could not establish a session.
    Failed(ConnectionError),
    /// An established session dropped.
    Lost(ConnectionError),
}

async fn drive(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    mut shutdown: watch::Receiver<bool>,
) {
    let url = match websocket_url(&shared.config.socket_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "realtime connection disabled");
            return;
        }
    };
    let policy = shared.config.reconnect;
    let mut backoff = Backoff::new(policy);
    let mut rng = StdRng::from_os_rng();

    shared.set_state(TransportState::Connecting);
    loop {
        let end = run_session(&shared, connector.as_ref(), &url, &mut outbound, &mut shutdown, &mut backoff).await;
        shared.set_socket_id(None);

        match end {
            SessionEnd::Shutdown => {
                tracing::info!("realtime connection closed");
                break;
            }
            SessionEnd::ServerDisconnect => {
                tracing::info!("server ended the realtime session");
                break;
            }
            SessionEnd::Failed(e) => {
                tracing::warn!(error = %e, attempt = backoff.attempts(), "realtime connect failed");
            }
            SessionEnd::Lost(e) => {
                tracing::warn!(error = %e, "realtime connection lost");
            }
        }

        if !policy.enabled {
            break;
        }
        if backoff.exhausted() {
            tracing::warn!(attempts = backoff.attempts(), "giving up on realtime reconnection");
            shared.set_state(TransportState::Disconnected);
            if let Some(callback) = shared.reconnect_failed_callback() {
                callback();
            }
            return;
        }

        let delay = backoff.next_delay(&mut rng);
        shared.set_state(TransportState::Reconnecting);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(delay_ms, attempt = backoff.attempts(), "reconnecting");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = wait_shutdown(&mut shutdown) => {
                tracing::info!("realtime connection closed");
                break;
            }
        }
    }
    shared.set_state(TransportState::Disconnected);
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // Err means every handle is gone, which is a shutdown too.
    let _ = shutdown.wait_for(|closed| *closed).await;
}

async fn run_session(
    shared: &Shared,
    connector: &dyn Connector,
    url: &str,
    outbound: &mut mpsc::UnboundedReceiver<Outgoing>,
    shutdown: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> SessionEnd {
    let establish = tokio::time::timeout(shared.config.connect_timeout, establish(shared, connector, url));
    let (link, handshake, socket_id) = tokio::select! {
        result = establish => match result {
            Ok(Ok(established)) => established,
            Ok(Err(e)) => return SessionEnd::Failed(e),
            Err(_) => return SessionEnd::Failed(ConnectionError::HandshakeTimeout),
        },
        () = wait_shutdown(shutdown) => return SessionEnd::Shutdown,
    };

    backoff.reset();
    shared.set_socket_id(Some(socket_id.clone()));
    shared.set_state(TransportState::Connected);
    tracing::info!(%socket_id, "realtime connected");

    if let Err(e) = announce(shared, &link) {
        return SessionEnd::Lost(e);
    }
    pump(shared, link, &handshake, outbound, shutdown).await
}

/// Open the transport and complete the namespace connect.
async fn establish(
    shared: &Shared,
    connector: &dyn Connector,
    url: &str,
) -> Result<(TransportLink, Handshake, String), ConnectionError> {
    let mut link = connector.connect(url).await?;

    let handshake = match link.recv().await? {
        EnginePacket::Open(handshake) => handshake,
        other => return Err(ConnectionError::UnexpectedPacket(format!("{other:?}"))),
    };

    let auth = shared.session.token().map(|token| serde_json::json!({ "token": token }));
    link.send(&EnginePacket::connect(auth))?;

    loop {
        match link.recv().await? {
            EnginePacket::Message(SocketPacket::Connect(ack)) => {
                let socket_id = ack
                    .as_ref()
                    .and_then(|ack| ack.get("sid"))
                    .and_then(Value::as_str)
                    .unwrap_or(&handshake.sid)
                    .to_owned();
                return Ok((link, handshake, socket_id));
            }
            EnginePacket::Message(SocketPacket::ConnectError(body)) => {
                return Err(ConnectionError::Rejected(error_message(&body)));
            }
            EnginePacket::Ping => link.send(&EnginePacket::Pong)?,
            EnginePacket::Noop => {}
            other => return Err(ConnectionError::UnexpectedPacket(format!("{other:?}"))),
        }
    }
}

/// Identify the user and restore rooms on a fresh session.
fn announce(shared: &Shared, link: &TransportLink) -> Result<(), ConnectionError> {
    let mut events = Vec::new();
    if let Some(user_id) = shared.session.user_id() {
        events.push(OutboundEvent::UserLogin(UserLogin { user_id }));
    }
    events.extend(shared.tracked_parcels().into_iter().map(OutboundEvent::JoinTracking));

    for event in events {
        match event.to_data() {
            Ok(data) => link.send(&EnginePacket::event(event.name(), data))?,
            Err(e) => tracing::warn!(event = event.name(), error = %e, "dropping unserializable event"),
        }
    }
    Ok(())
}

async fn pump(
    shared: &Shared,
    mut link: TransportLink,
    handshake: &Handshake,
    outbound: &mut mpsc::UnboundedReceiver<Outgoing>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let silence = std::time::Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);

    loop {
        tokio::select! {
            biased;
            () = wait_shutdown(shutdown) => {
                let _ = link.send(&EnginePacket::Message(SocketPacket::Disconnect));
                return SessionEnd::Shutdown;
            }
            incoming = tokio::time::timeout(silence, link.incoming.recv()) => {
                let text = match incoming {
                    Ok(Some(text)) => text,
                    Ok(None) => return SessionEnd::Lost(ConnectionError::Closed),
                    Err(_) => return SessionEnd::Lost(ConnectionError::HeartbeatTimeout),
                };
                match wire::decode_packet(&text) {
                    Ok(EnginePacket::Ping) => {
                        if link.send(&EnginePacket::Pong).is_err() {
                            return SessionEnd::Lost(ConnectionError::Closed);
                        }
                    }
                    Ok(EnginePacket::Close) => return SessionEnd::Lost(ConnectionError::Closed),
                    Ok(EnginePacket::Message(SocketPacket::Event { name, data })) => {
                        shared.dispatch(&name, &data);
                    }
                    Ok(EnginePacket::Message(SocketPacket::Disconnect)) => return SessionEnd::ServerDisconnect,
                    Ok(EnginePacket::Message(SocketPacket::ConnectError(body))) => {
                        return SessionEnd::Lost(ConnectionError::Rejected(error_message(&body)));
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "skipping undecodable packet"),
                }
            }
            next = outbound.recv() => {
                match next {
                    Some(Outgoing::Event { name, data }) => {
                        if link.send(&EnginePacket::event(name, data)).is_err() {
                            tracing::debug!(event = name, "transport closed before send");
                            return SessionEnd::Lost(ConnectionError::Closed);
                        }
                    }
                    Some(Outgoing::Flush(done)) => {
                        let _ = done.send(());
                    }
                    None => return SessionEnd::Shutdown,
                }
            }
        }
    }
}

fn error_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), str::to_owned)
}

/// Outbound queue of a connection without a driver.
#[cfg(test)]
pub(crate) struct Outbox(mpsc::UnboundedReceiver<Outgoing>);

#[cfg(test)]
impl Outbox {
    /// Everything emitted so far, as `(name, data)` pairs.
    pub(crate) fn drain(&mut self) -> Vec<(String, Value)> {
        let mut sent = Vec::new();
        while let Ok(outgoing) = self.0.try_recv() {
            if let Outgoing::Event { name, data } = outgoing {
                sent.push((name.to_owned(), data));
            }
        }
        sent
    }
}

/// A connection that never opens a transport; emitted events land in the
/// returned [`Outbox`].
#[cfg(test)]
pub(crate) fn detached(config: ClientConfig, session: Arc<SessionStore>) -> (Connection, Outbox) {
    let (connection, outbound, _shutdown) = Connection::unstarted(config, session);
    (connection, Outbox(outbound))
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
