//! WebSocket listener facade and lifecycle state machine.
//!
//! # Responsibilities
//! - Bind the configured port and start the connection registry
//! - Sequence the Created → Opening → Open → Closing → Closed lifecycle
//! - Route sends to the registry by connection identity
//! - Enforce the handler-registration window (before open only)

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use crate::net::identity::ConnectionId;
use crate::net::registry::{ConnectionRegistry, Handlers};
use crate::net::tls::{self, TlsContext, TlsContextCallback, TlsError};
use crate::observability::logging::{emit, LogCallback, LogEntry, LogLevel};

/// Gate for an incoming handshake: receives the requested resource path and
/// decides whether to accept. No handler configured means accept all.
pub type ValidateHandler = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Invoked once per accepted connection, with its path and identity.
pub type OpenHandler = Arc<dyn Fn(&str, &ConnectionId) + Send + Sync>;

/// Invoked once per closed connection, with its path and identity.
pub type CloseHandler = Arc<dyn Fn(&str, &ConnectionId) + Send + Sync>;

/// Immutable bundle of optional callbacks and bounds configuring a
/// [`Listener`]. Absent callbacks are valid defaults meaning no-op.
#[derive(Clone)]
pub struct ListenerConfig {
    log_callback: Option<LogCallback>,
    tls_context_callback: Option<TlsContextCallback>,
    handshake_timeout: Duration,
    close_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            log_callback: None,
            tls_context_callback: None,
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl ListenerConfig {
    pub fn log_callback(&self) -> Option<&LogCallback> {
        self.log_callback.as_ref()
    }

    /// Set the diagnostic sink receiving the listener's operational events.
    pub fn set_log_callback(&mut self, callback: impl Fn(&LogEntry) + Send + Sync + 'static) {
        self.log_callback = Some(Arc::new(callback));
    }

    pub fn tls_context_callback(&self) -> Option<&TlsContextCallback> {
        self.tls_context_callback.as_ref()
    }

    /// Set the hook customizing the TLS context of a secure listener.
    /// Invoked once per context construction, i.e. once per `open()`.
    pub fn set_tls_context_callback(
        &mut self,
        callback: impl Fn(&mut TlsContext) + Send + Sync + 'static,
    ) {
        self.tls_context_callback = Some(Arc::new(callback));
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Bound on each of the TLS and WebSocket handshakes, per connection.
    /// An unresponsive remote must not pin a registry slot forever.
    pub fn set_handshake_timeout(&mut self, timeout: Duration) {
        self.handshake_timeout = timeout;
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Bound on connection draining during `close()`; connections still
    /// open past it are force-terminated.
    pub fn set_close_timeout(&mut self, timeout: Duration) {
        self.close_timeout = timeout;
    }
}

/// Lifecycle state of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Constructed, not yet opened.
    Created,
    /// `open()` in progress.
    Opening,
    /// Bound and accepting connections.
    Open,
    /// `close()` in progress.
    Closing,
    /// Terminal; the instance cannot be reopened.
    Closed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Created => write!(f, "created"),
            ListenerState::Opening => write!(f, "opening"),
            ListenerState::Open => write!(f, "open"),
            ListenerState::Closing => write!(f, "closing"),
            ListenerState::Closed => write!(f, "closed"),
        }
    }
}

/// Error type for listener lifecycle operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind the listening socket.
    Bind(std::io::Error),
    /// Failed to construct the TLS context for a secure listener.
    Tls(TlsError),
    /// Operation not valid in the listener's current state.
    InvalidState(ListenerState),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "failed to bind: {}", e),
            ListenerError::Tls(e) => write!(f, "TLS context construction failed: {}", e),
            ListenerError::InvalidState(state) => {
                write!(f, "operation not valid while listener is {}", state)
            }
        }
    }
}

impl std::error::Error for ListenerError {}

/// Error type for sends to a specific connection.
#[derive(Debug)]
pub enum SendError {
    /// The identity does not name a live connection: it never did, or the
    /// connection has closed. Expected whenever a send races a close;
    /// callers treat it as recoverable.
    ConnectionNotFound,
    /// The connection started closing while the message was queued.
    ConnectionClosed,
    /// The transport rejected the write; the connection is being closed.
    Transport(tokio_tungstenite::tungstenite::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ConnectionNotFound => write!(f, "connection not found"),
            SendError::ConnectionClosed => write!(f, "connection closed before the send completed"),
            SendError::Transport(e) => write!(f, "send failed: {}", e),
        }
    }
}

impl std::error::Error for SendError {}

/// Server-side WebSocket listener.
///
/// Binds one TCP port, optionally secured with TLS, and accepts an
/// unbounded set of concurrent connections. Acceptance is gated by the
/// validate handler; the open and close handlers observe each connection's
/// lifecycle and receive its [`ConnectionId`], through which [`send`]
/// addresses it from any task.
///
/// The listener exclusively owns its bound socket and connection registry,
/// so the type is move-only; two owners of one listening socket is not a
/// meaningful state.
///
/// [`send`]: Listener::send
pub struct Listener {
    port: u16,
    secure: bool,
    config: ListenerConfig,
    state: ListenerState,
    validate_handler: Option<ValidateHandler>,
    open_handler: Option<OpenHandler>,
    close_handler: Option<CloseHandler>,
    registry: Option<Arc<ConnectionRegistry>>,
    bound_port: Option<u16>,
}

impl Listener {
    pub fn new(secure: bool, port: u16, config: ListenerConfig) -> Self {
        Self {
            port,
            secure,
            config,
            state: ListenerState::Created,
            validate_handler: None,
            open_handler: None,
            close_handler: None,
            registry: None,
            bound_port: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// The bound port once open; the configured port before that.
    /// A configured port of 0 binds an OS-assigned ephemeral port.
    pub fn port(&self) -> u16 {
        self.bound_port.unwrap_or(self.port)
    }

    /// Register the acceptance gate. Rejected once `open()` has been
    /// called: changing handlers under in-flight handshakes is a race.
    pub fn set_validate_handler(
        &mut self,
        handler: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Result<(), ListenerError> {
        self.check_not_opened()?;
        self.validate_handler = Some(Arc::new(handler));
        Ok(())
    }

    /// Register the connection-open observer. Rejected once `open()` has
    /// been called.
    pub fn set_open_handler(
        &mut self,
        handler: impl Fn(&str, &ConnectionId) + Send + Sync + 'static,
    ) -> Result<(), ListenerError> {
        self.check_not_opened()?;
        self.open_handler = Some(Arc::new(handler));
        Ok(())
    }

    /// Register the connection-close observer. Rejected once `open()` has
    /// been called.
    pub fn set_close_handler(
        &mut self,
        handler: impl Fn(&str, &ConnectionId) + Send + Sync + 'static,
    ) -> Result<(), ListenerError> {
        self.check_not_opened()?;
        self.close_handler = Some(Arc::new(handler));
        Ok(())
    }

    fn check_not_opened(&self) -> Result<(), ListenerError> {
        if self.state == ListenerState::Created {
            Ok(())
        } else {
            Err(ListenerError::InvalidState(self.state))
        }
    }

    /// Bind the configured port and start accepting connections.
    ///
    /// Valid only from `Created`. On failure (port unavailable, TLS context
    /// construction failed) the listener is terminally closed and must not
    /// be reused.
    pub async fn open(&mut self) -> Result<(), ListenerError> {
        if self.state != ListenerState::Created {
            return Err(ListenerError::InvalidState(self.state));
        }
        self.state = ListenerState::Opening;
        match self.bind_and_start().await {
            Ok(()) => {
                self.state = ListenerState::Open;
                Ok(())
            }
            Err(e) => {
                self.state = ListenerState::Closed;
                self.registry = None;
                self.diag(
                    LogLevel::Error,
                    "listener",
                    format!("open failed: {e}"),
                );
                Err(e)
            }
        }
    }

    async fn bind_and_start(&mut self) -> Result<(), ListenerError> {
        let acceptor = if self.secure {
            Some(tls::build_acceptor(self.config.tls_context_callback()).map_err(ListenerError::Tls)?)
        } else {
            None
        };
        let socket = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(ListenerError::Bind)?;
        let bound_port = socket.local_addr().map_err(ListenerError::Bind)?.port();
        self.bound_port = Some(bound_port);

        let registry = Arc::new(ConnectionRegistry::new(
            self.config.clone(),
            acceptor,
            Handlers {
                validate: self.validate_handler.clone(),
                open: self.open_handler.clone(),
                close: self.close_handler.clone(),
            },
        ));
        registry.start(socket);
        self.registry = Some(registry);
        self.diag(
            LogLevel::Info,
            "listener",
            format!(
                "listening for {} connections on port {}",
                if self.secure { "wss" } else { "ws" },
                bound_port
            ),
        );
        Ok(())
    }

    /// Stop accepting, close every live connection, release the socket.
    ///
    /// Each open connection's close handler has fired by the time this
    /// resolves. Tolerated as a no-op if the listener is already closing
    /// or closed.
    pub async fn close(&mut self) -> Result<(), ListenerError> {
        match self.state {
            ListenerState::Open => {}
            ListenerState::Closing | ListenerState::Closed => return Ok(()),
            ListenerState::Created | ListenerState::Opening => {
                self.state = ListenerState::Closed;
                return Ok(());
            }
        }
        self.state = ListenerState::Closing;
        if let Some(registry) = self.registry.take() {
            registry.close().await;
        }
        self.state = ListenerState::Closed;
        self.diag(LogLevel::Info, "listener", "listener closed".to_string());
        Ok(())
    }

    /// Queue `message` for delivery on the identified connection.
    ///
    /// Submission never blocks on the transmission; the returned future
    /// resolves once the frame has been written, or with the failure.
    /// Sends it has accepted for one identity are delivered in the order
    /// accepted. An identity that does not name a live connection fails
    /// with [`SendError::ConnectionNotFound`].
    pub async fn send(&self, id: &ConnectionId, message: Message) -> Result<(), SendError> {
        match &self.registry {
            Some(registry) => registry.send(id, message).await,
            None => Err(SendError::ConnectionNotFound),
        }
    }

    fn diag(&self, level: LogLevel, category: &'static str, message: String) {
        emit(self.config.log_callback(), level, category, message);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            // dropped without close(); stop accepting and let the live
            // sessions wind down in the background
            registry.trigger_shutdown();
        }
    }
}
