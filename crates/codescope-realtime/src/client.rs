//! The realtime client and its connection driver.
//!
//! A [`RealtimeClient`] owns one driver task. The driver is the only writer of
//! the connection state: it opens connections through a [`Connector`], decodes
//! inbound frames and dispatches them, writes queued outbound messages, runs
//! the heartbeat while the session is open, and schedules reconnects. Handlers
//! run on the driver task, one at a time, in frame arrival order.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use codescope_core::{ConfigError, ConnectionId, Message, ProjectId, Topic};

use crate::config::{ClientConfig, Endpoint};
use crate::heartbeat::Heartbeat;
use crate::reconnect::{BackoffPolicy, ReconnectStep, Reconnector};
use crate::registry::{DispatchRegistry, MessageHandler, Subscription};
use crate::state::{ConnectionState, SharedState};
use crate::transport::{Connection, Connector, Frame, FrameSink, WsConnector};

/// Cheap handle for sending on a client's connection.
///
/// Holds no reference to the client itself, so handlers may capture it.
#[derive(Clone, Debug)]
pub struct MessageSender {
    shared: Arc<SharedState>,
    outbound: mpsc::Sender<Message>,
}

impl MessageSender {
    /// Queue `message` for the live connection.
    ///
    /// Dropped with a warning unless the connection is open. Never blocks and
    /// never retries. Returns whether the message was queued.
    pub fn send(&self, message: Message) -> bool {
        let state = self.shared.get();
        if !state.is_open() {
            warn!(
                message_type = %message.message_type(),
                state = %state,
                "realtime connection not open, dropping message"
            );
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(message_type = %message.message_type(), "outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                warn!(message_type = %message.message_type(), "client shut down, dropping message");
                false
            }
        }
    }

    /// Ask the server for updates about `project_id`.
    pub fn subscribe_to_project(&self, project_id: &ProjectId) -> bool {
        self.send(Message::subscribe_project(project_id))
    }

    /// Send a heartbeat now.
    pub fn ping(&self) -> bool {
        self.send(Message::ping())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.get().is_open()
    }
}

/// Realtime update client.
///
/// Construct, subscribe, then [`connect`](Self::connect). Lifecycle messages
/// (`connected`, `disconnected`, `error`, `maxReconnectAttemptsReached`) are
/// dispatched through the same registry as server messages.
pub struct RealtimeClient {
    endpoint: Endpoint,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    registry: DispatchRegistry,
    shared: Arc<SharedState>,
    sender: MessageSender,
    outbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Client over WebSockets.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Client over a custom connector.
    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint()?;
        let shared = Arc::new(SharedState::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        Ok(Self {
            endpoint,
            config,
            connector,
            registry: DispatchRegistry::new(),
            sender: MessageSender {
                shared: Arc::clone(&shared),
                outbound: outbound_tx,
            },
            shared,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: CancellationToken::new(),
            driver: Mutex::new(None),
        })
    }

    /// Start the connection driver. Only the first call has an effect.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        if self.shutdown.is_cancelled() {
            warn!(url = %self.endpoint, "connect called after shutdown, ignoring");
            return;
        }
        let Some(outbound) = self.outbound_rx.lock().take() else {
            debug!(url = %self.endpoint, "connection driver already running");
            return;
        };

        let driver = Driver {
            endpoint: self.endpoint.clone(),
            connector: Arc::clone(&self.connector),
            registry: self.registry.clone(),
            shared: Arc::clone(&self.shared),
            outbound,
            shutdown: self.shutdown.clone(),
            reconnector: Reconnector::new(BackoffPolicy::new(
                self.config.base_delay(),
                self.config.max_reconnect_attempts,
            )),
            heartbeat_interval: self.config.heartbeat_interval(),
        };
        let handle = tokio::spawn(driver.run());
        *self.driver.lock() = Some(handle);
    }

    /// Register `handler` for `topic`.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Message) -> Result<(), codescope_core::HandlerError> + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, handler)
    }

    /// Remove the first registration of `handler` under `topic`.
    pub fn unsubscribe(&self, topic: &Topic, handler: &Arc<dyn MessageHandler>) -> bool {
        self.registry.unsubscribe(topic, handler)
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    /// See [`MessageSender::send`].
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message)
    }

    pub fn subscribe_to_project(&self, project_id: &ProjectId) -> bool {
        self.sender.subscribe_to_project(project_id)
    }

    pub fn ping(&self) -> bool {
        self.sender.ping()
    }

    /// A detached sending handle.
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.get().is_open()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe()
    }

    /// Failed attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stop the driver, close the connection and drop every subscription.
    ///
    /// Cancels any pending heartbeat or reconnect timer. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.outbound_rx.lock().take();
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "connection driver ended abnormally");
            }
        }
        self.registry.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    Lost,
    Shutdown,
}

struct Driver {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    registry: DispatchRegistry,
    shared: Arc<SharedState>,
    outbound: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
    reconnector: Reconnector,
    heartbeat_interval: Duration,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.shared.set(ConnectionState::Connecting);
            debug!(url = %self.endpoint, attempt = self.reconnector.attempts(), "connecting");

            let attempt = tokio::select! {
                () = self.shutdown.cancelled() => break,
                result = self.connector.connect(&self.endpoint) => result,
            };

            match attempt {
                Ok(connection) => {
                    self.reconnector.on_open();
                    self.shared.set_attempts(0);
                    if self.run_session(connection).await == SessionEnd::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    warn!(url = %self.endpoint, error = %e, kind = e.error_kind(), "connection attempt failed");
                    self.shared.set(ConnectionState::Closed);
                    self.dispatch(&Message::error(e.to_string()));
                    self.dispatch(&Message::disconnected());
                }
            }

            match self.reconnector.next_step() {
                ReconnectStep::Retry { attempt, delay } => {
                    self.shared.set_attempts(attempt);
                    self.shared.set(ConnectionState::Reconnecting);
                    info!(
                        attempt,
                        max_attempts = self.reconnector.policy().max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "scheduling reconnect"
                    );
                    tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                ReconnectStep::Exhausted { attempts } => {
                    self.shared.set(ConnectionState::Exhausted);
                    error!(attempts, url = %self.endpoint, "max reconnect attempts reached, giving up");
                    self.dispatch(&Message::max_reconnect_attempts_reached());
                    return;
                }
                ReconnectStep::Halted => return,
            }
        }
        self.shared.set(ConnectionState::Closed);
        debug!(url = %self.endpoint, "connection driver stopped");
    }

    async fn run_session(&mut self, connection: Connection) -> SessionEnd {
        let connection_id = ConnectionId::new();
        let Connection { mut sink, mut stream } = connection;

        // Messages queued for an earlier connection are never replayed.
        while self.outbound.try_recv().is_ok() {}

        self.shared.set(ConnectionState::Open);
        info!(%connection_id, url = %self.endpoint, "realtime connection open");
        self.dispatch(&Message::connected());

        let mut heartbeat = Heartbeat::start(self.heartbeat_interval);
        let end = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    if let Err(e) = sink.close().await {
                        debug!(%connection_id, error = %e, "close on shutdown failed");
                    }
                    break SessionEnd::Shutdown;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Close(reason))) => {
                        info!(%connection_id, reason = reason.as_deref().unwrap_or(""), "server closed connection");
                        break SessionEnd::Lost;
                    }
                    Some(Ok(frame)) => self.handle_frame(&connection_id, &frame),
                    Some(Err(e)) => {
                        warn!(%connection_id, error = %e, kind = e.error_kind(), "transport error");
                        self.dispatch(&Message::error(e.to_string()));
                    }
                    None => break SessionEnd::Lost,
                },
                Some(message) = self.outbound.recv() => {
                    self.write(&connection_id, &mut sink, &message).await;
                }
                () = heartbeat.tick() => {
                    debug!(%connection_id, tick = heartbeat.ticks(), "heartbeat");
                    self.write(&connection_id, &mut sink, &Message::ping()).await;
                }
            }
        };

        if end == SessionEnd::Lost {
            self.shared.set(ConnectionState::Closed);
            info!(%connection_id, "realtime connection closed");
            self.dispatch(&Message::disconnected());
        }
        end
    }

    fn handle_frame(&self, connection_id: &ConnectionId, frame: &Frame) {
        match frame.decode() {
            Ok(Some(message)) => {
                debug!(%connection_id, message_type = %message.message_type(), "message received");
                self.dispatch(&message);
            }
            Ok(None) => {}
            Err(e) => warn!(%connection_id, error = %e, "dropping malformed frame"),
        }
    }

    async fn write(&self, connection_id: &ConnectionId, sink: &mut FrameSink, message: &Message) {
        let frame = match Frame::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%connection_id, message_type = %message.message_type(), error = %e, "failed to encode message");
                return;
            }
        };
        if let Err(e) = sink.send(frame).await {
            warn!(%connection_id, message_type = %message.message_type(), error = %e, "send failed");
            self.dispatch(&Message::error(e.to_string()));
        }
    }

    fn dispatch(&self, message: &Message) {
        let report = self.registry.dispatch(message);
        if report.failed > 0 {
            debug!(
                message_type = %message.message_type(),
                delivered = report.delivered,
                failed = report.failed,
                "dispatch had handler failures"
            );
        }
    }
}
