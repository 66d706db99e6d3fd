//! Push socket: connect, authenticate, route messages, reconnect on drop.
//!
//! DESIGN
//! ======
//! `connect()` spawns one driver task that owns the transport. The driver
//! loops: dial, send the auth envelope, read until the session ends, and then
//! either stops (intentional close, server going away, auth rejected) or
//! sleeps on the [`Backoff`] schedule and dials again. Each driver carries an
//! id; only the current driver may publish state or own the outbound sender,
//! so a driver that is still winding down after `close()` cannot clobber the
//! one that replaced it.
//!
//! The state is published through a `watch` channel. `Open` is entered on the
//! first message a connection delivers, which is also what resets the
//! backoff and, after a drop, emits the local `_reconnected` event.
//!
//! ERROR HANDLING
//! ==============
//! Dial errors, token failures, and transport errors are logged and treated
//! as a drop. Nothing is surfaced to callers except through state and the
//! `_disconnected` / `_reconnected` events.

#[path = "socket_backoff.rs"]
mod backoff;

pub use backoff::{Backoff, ReconnectAttempt};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use crate::config::ReconnectPolicy;
use crate::error::ClientError;
use crate::events::{EventKind, auth_message, outbound_message};
use crate::router::EventRouter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why the socket stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called or the server closed with "going away".
    Intentional,
    /// The transport was lost; a reconnect is scheduled.
    Dropped,
    /// The server rejected the auth token; no reconnect will be attempted.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed(CloseReason),
}

/// Supplies the bearer token sent in the socket's auth envelope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, ClientError>;
}

/// A fixed token, for tools and tests that manage auth themselves.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

pub struct SocketConnection {
    shared: Arc<Shared>,
}

struct Shared {
    url: String,
    policy: ReconnectPolicy,
    tokens: Arc<dyn TokenSource>,
    router: EventRouter,
    state_tx: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    driver: Option<Driver>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

struct Driver {
    id: Uuid,
    shutdown: watch::Sender<bool>,
    wake: Arc<Notify>,
    /// Taken by `close()` so it can await the driver's exit.
    task: Option<JoinHandle<()>>,
}

enum SessionEnd {
    Clean,
    Dropped,
    Rejected,
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SocketConnection {
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when `policy` is inconsistent.
    pub fn new(
        url: String,
        policy: ReconnectPolicy,
        tokens: Arc<dyn TokenSource>,
        router: EventRouter,
    ) -> Result<Self, ClientError> {
        policy.validate()?;
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Ok(Self {
            shared: Arc::new(Shared { url, policy, tokens, router, state_tx, control: Mutex::new(Control::default()) }),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Start (or resume) connecting.
    ///
    /// No-op while a connection is being dialed or is open. While a reconnect
    /// is waiting out its backoff delay, the wait is cut short and the driver
    /// dials immediately. Must be called inside a Tokio runtime.
    pub fn connect(&self) {
        let mut control = self.shared.lock_control();
        if let Some(driver) = &control.driver {
            let running = driver.task.as_ref().is_some_and(|task| !task.is_finished());
            if running {
                match self.state() {
                    ConnectionState::Closed(CloseReason::Dropped) => {
                        tracing::debug!(driver = %driver.id, "connect requested during backoff; dialing now");
                        driver.wake.notify_one();
                    }
                    state => tracing::debug!(driver = %driver.id, ?state, "connect ignored; socket already active"),
                }
                return;
            }
        }

        let id = Uuid::new_v4();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(drive(Arc::clone(&self.shared), id, shutdown_rx, Arc::clone(&wake)));
        control.driver = Some(Driver { id, shutdown, wake, task: Some(task) });
        control.outbound = None;
        self.shared.state_tx.send_replace(ConnectionState::Connecting);
        tracing::info!(driver = %id, url = %self.shared.url, "socket connecting");
    }

    /// Intentionally close the socket. No reconnect follows.
    ///
    /// Sends a "going away" close frame when open and waits for the driver to
    /// wind down.
    pub async fn close(&self) {
        let (id, task) = {
            let mut control = self.shared.lock_control();
            let Some(driver) = control.driver.as_mut() else {
                return;
            };
            driver.shutdown.send_replace(true);
            (driver.id, driver.task.take())
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(driver = %id, error = %e, "socket driver ended abnormally");
            }
        }

        let mut control = self.shared.lock_control();
        if control.driver.as_ref().is_some_and(|driver| driver.id == id) {
            control.driver = None;
            control.outbound = None;
            self.shared.state_tx.send_replace(ConnectionState::Closed(CloseReason::Intentional));
        }
    }

    /// Send an event envelope over the open socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SocketClosed`] when no connection is open.
    pub fn send(&self, tag: &str, payload: Option<Value>) -> Result<(), ClientError> {
        let control = self.shared.lock_control();
        let Some(outbound) = &control.outbound else {
            return Err(ClientError::SocketClosed);
        };
        outbound
            .send(Message::Text(outbound_message(tag, payload).into()))
            .map_err(|_| ClientError::SocketClosed)
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        if let Some(driver) = &self.shared.lock_control().driver {
            driver.shutdown.send_replace(true);
        }
    }
}

impl Shared {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.lock_control().driver.as_ref().is_some_and(|driver| driver.id == id)
    }

    fn publish(&self, id: Uuid, state: ConnectionState) {
        let control = self.lock_control();
        if control.driver.as_ref().is_some_and(|driver| driver.id == id) {
            self.state_tx.send_replace(state);
        }
    }

    fn set_outbound(&self, id: Uuid, outbound: Option<mpsc::UnboundedSender<Message>>) {
        let mut control = self.lock_control();
        if control.driver.as_ref().is_some_and(|driver| driver.id == id) {
            control.outbound = outbound;
        }
    }

    /// Drive one authenticated session until it ends.
    async fn run_session(
        &self,
        id: Uuid,
        stream: WsStream,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
        recovering: &mut bool,
    ) -> SessionEnd {
        let (mut sink, mut source) = stream.split();

        let token = tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(Some(going_away()))).await;
                return SessionEnd::Clean;
            }
            token = self.tokens.access_token() => token,
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(driver = %id, error = %e, "no token for socket auth");
                let _ = sink.close().await;
                return SessionEnd::Dropped;
            }
        };
        if let Err(e) = sink.send(Message::Text(auth_message(&token).into())).await {
            tracing::warn!(driver = %id, error = %e, "socket auth send failed");
            return SessionEnd::Dropped;
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        self.set_outbound(id, Some(outbound_tx));

        let mut opened = false;
        let mut closing = false;
        let mut rejected = false;

        let end = loop {
            tokio::select! {
                _ = shutdown.changed(), if !closing => {
                    closing = true;
                    self.publish(id, ConnectionState::Closing);
                    if sink.send(Message::Close(Some(going_away()))).await.is_err() {
                        break SessionEnd::Clean;
                    }
                }
                Some(msg) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(msg).await {
                        tracing::warn!(driver = %id, error = %e, "socket send failed");
                        break lost(closing, rejected);
                    }
                }
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !opened {
                            opened = true;
                            backoff.reset();
                            self.publish(id, ConnectionState::Open);
                            if std::mem::take(recovering) {
                                tracing::info!(driver = %id, "socket reconnected");
                                self.router.emit(EventKind::Reconnected);
                            }
                        }
                        if let Some(event) = self.router.on_message(text.as_str()) {
                            if let EventKind::AuthRejected(status) = &event.kind {
                                tracing::warn!(driver = %id, ?status, "socket auth rejected; reconnect disabled");
                                rejected = true;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let away = frame.as_ref().is_some_and(|f| f.code == CloseCode::Away);
                        tracing::debug!(driver = %id, ?frame, "socket close frame received");
                        if rejected {
                            break SessionEnd::Rejected;
                        }
                        break if closing || away { SessionEnd::Clean } else { SessionEnd::Dropped };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(driver = %id, error = %e, "socket read failed");
                        break lost(closing, rejected);
                    }
                    None => break lost(closing, rejected),
                },
            }
        };

        self.set_outbound(id, None);
        end
    }
}

/// Session end when the transport goes away without a close frame.
fn lost(closing: bool, rejected: bool) -> SessionEnd {
    if rejected {
        SessionEnd::Rejected
    } else if closing {
        SessionEnd::Clean
    } else {
        SessionEnd::Dropped
    }
}

fn going_away() -> CloseFrame {
    CloseFrame { code: CloseCode::Away, reason: "client closing".into() }
}

async fn drive(shared: Arc<Shared>, id: Uuid, mut shutdown: watch::Receiver<bool>, wake: Arc<Notify>) {
    let mut backoff = Backoff::new(shared.policy);
    let mut recovering = false;

    let reason = loop {
        if *shutdown.borrow() {
            break CloseReason::Intentional;
        }
        shared.publish(id, ConnectionState::Connecting);

        let end = tokio::select! {
            _ = shutdown.changed() => SessionEnd::Clean,
            dialed = connect_async(shared.url.as_str()) => match dialed {
                Ok((stream, _)) => {
                    tracing::debug!(driver = %id, "socket transport established");
                    shared.run_session(id, stream, &mut shutdown, &mut backoff, &mut recovering).await
                }
                Err(e) => {
                    tracing::warn!(driver = %id, error = %e, "socket dial failed");
                    SessionEnd::Dropped
                }
            },
        };

        match end {
            SessionEnd::Clean => break CloseReason::Intentional,
            SessionEnd::Rejected => break CloseReason::Rejected,
            SessionEnd::Dropped => {}
        }

        shared.publish(id, ConnectionState::Closed(CloseReason::Dropped));
        if shared.is_current(id) {
            shared.router.emit(EventKind::Disconnected);
        }
        recovering = true;

        let next = backoff.next_delay();
        tracing::info!(
            driver = %id,
            attempt = next.attempt,
            delay_ms = u64::try_from(next.delay.as_millis()).unwrap_or(u64::MAX),
            "socket dropped; reconnect scheduled"
        );
        tokio::select! {
            () = tokio::time::sleep(next.delay) => {}
            () = wake.notified() => {}
            _ = shutdown.changed() => break CloseReason::Intentional,
        }
    };

    shared.publish(id, ConnectionState::Closed(reason));
    tracing::info!(driver = %id, ?reason, "socket stopped");
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
