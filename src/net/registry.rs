//! Connection registry: accept loop, handshake pipeline, live-connection set.
//!
//! # Responsibilities
//! - Accept incoming TCP connections and run the TLS + WebSocket handshakes
//! - Gate acceptance through the validate handler
//! - Own the live connection set, keyed by identity (ordered lookup)
//! - Serve per-connection sends in submission order
//! - Drive orderly close of every connection when the listener closes
//!
//! # Data Flow
//! ```text
//! TCP accept → TLS handshake → WebSocket upgrade → validate handler
//!     → record + identity → open handler
//!     → session loop (outbound queue / inbound frames / shutdown)
//!     → record removed → close handler
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, timeout, Instant};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::lifecycle::Shutdown;
use crate::net::identity::ConnectionId;
use crate::net::listener::{
    CloseHandler, ListenerConfig, OpenHandler, SendError, ValidateHandler,
};
use crate::observability::logging::{emit, LogLevel};

/// Interval between quiescence checks while draining connections.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Global counter for connection serials. Relaxed is enough, only
/// uniqueness matters.
static CONNECTION_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Per-connection control record. Owned by the registry; identities hold
/// weak references to it, so it must not be dropped while its entry is
/// live.
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    /// Serial used for log labels. Identity comparisons never read it.
    serial: u64,
    /// Resource path presented during the opening handshake.
    path: String,
    /// Remote peer address.
    peer: SocketAddr,
}

impl ConnectionRecord {
    pub(crate) fn new(path: String, peer: SocketAddr) -> Self {
        Self {
            serial: CONNECTION_SERIAL.fetch_add(1, Ordering::Relaxed),
            path,
            peer,
        }
    }
}

/// One queued outbound message plus its completion slot.
struct Outbound {
    message: Message,
    done: oneshot::Sender<Result<(), SendError>>,
}

/// Live-set entry for one open connection.
struct ConnectionHandle {
    record: Arc<ConnectionRecord>,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// Kills the connection's I/O loop; its session still runs teardown.
    abort: AbortHandle,
}

/// Handler slots captured when the listener opens.
pub(crate) struct Handlers {
    pub(crate) validate: Option<ValidateHandler>,
    pub(crate) open: Option<OpenHandler>,
    pub(crate) close: Option<CloseHandler>,
}

/// Owns the accept loop and the live connection set.
pub(crate) struct ConnectionRegistry {
    config: ListenerConfig,
    tls: Option<TlsAcceptor>,
    handlers: Handlers,
    /// Live connections, addressable by identity. Ordered map: identities
    /// deliberately have no hash.
    connections: Mutex<BTreeMap<ConnectionId, ConnectionHandle>>,
    /// Sessions between record insertion and close-handler completion.
    active_sessions: AtomicUsize,
    shutdown: Shutdown,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionRegistry {
    pub(crate) fn new(config: ListenerConfig, tls: Option<TlsAcceptor>, handlers: Handlers) -> Self {
        Self {
            config,
            tls,
            handlers,
            connections: Mutex::new(BTreeMap::new()),
            active_sessions: AtomicUsize::new(0),
            shutdown: Shutdown::new(),
            accept_task: Mutex::new(None),
        }
    }

    /// Start the accept loop on the bound socket.
    pub(crate) fn start(self: &Arc<Self>, socket: TcpListener) {
        let registry = Arc::clone(self);
        let task = tokio::spawn(async move { registry.accept_loop(socket).await });
        *self.accept_task.lock().unwrap() = Some(task);
    }

    async fn accept_loop(self: Arc<Self>, socket: TcpListener) {
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = socket.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let registry = Arc::clone(&self);
                        tokio::spawn(async move { registry.run_session(stream, peer).await });
                    }
                    Err(e) => {
                        self.diag(LogLevel::Warning, "accept", format!("accept failed: {e}"));
                        // don't spin on persistent accept errors
                        sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
        // dropping the socket here releases the listening port
    }

    /// One accepted TCP connection, from handshake to teardown.
    async fn run_session(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        match self.tls.clone() {
            Some(acceptor) => {
                match timeout(self.config.handshake_timeout(), acceptor.accept(stream)).await {
                    Ok(Ok(tls_stream)) => self.serve(tls_stream, peer).await,
                    Ok(Err(e)) => self.diag(
                        LogLevel::Debug,
                        "handshake",
                        format!("TLS handshake with {peer} failed: {e}"),
                    ),
                    Err(_) => self.diag(
                        LogLevel::Debug,
                        "handshake",
                        format!("TLS handshake with {peer} timed out"),
                    ),
                }
            }
            None => self.serve(stream, peer).await,
        }
    }

    async fn serve<S>(self: Arc<Self>, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut path = String::from("/");
        let mut rejected = false;
        let handshake = {
            let validate = self.handlers.validate.clone();
            let path = &mut path;
            let rejected = &mut rejected;
            let callback = move |request: &Request, response: Response| {
                *path = request.uri().path().to_string();
                if validate.as_ref().map_or(true, |handler| handler(path)) {
                    Ok(response)
                } else {
                    *rejected = true;
                    let mut refusal = ErrorResponse::new(Some("connection rejected".to_string()));
                    *refusal.status_mut() = StatusCode::FORBIDDEN;
                    Err(refusal)
                }
            };
            timeout(self.config.handshake_timeout(), accept_hdr_async(stream, callback)).await
        };
        let websocket = match handshake {
            Ok(Ok(websocket)) => websocket,
            Ok(Err(e)) => {
                if rejected {
                    self.diag(
                        LogLevel::Info,
                        "handshake",
                        format!("connection from {peer} rejected by validate handler: {path}"),
                    );
                } else {
                    self.diag(
                        LogLevel::Debug,
                        "handshake",
                        format!("WebSocket handshake with {peer} failed: {e}"),
                    );
                }
                return;
            }
            Err(_) => {
                self.diag(
                    LogLevel::Debug,
                    "handshake",
                    format!("WebSocket handshake with {peer} timed out"),
                );
                return;
            }
        };

        let record = Arc::new(ConnectionRecord::new(path, peer));
        let id = ConnectionId::attached(&record);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // the counter goes up before the registration check below; once
        // close() has observed the shutdown flag as set, any session that
        // passed the check is already visible to its drain loop
        self.active_sessions.fetch_add(1, Ordering::SeqCst);

        // the I/O loop runs in its own task so close() can abort a
        // connection that will not drain; this session survives the abort
        // and still runs the teardown below
        let io_task = tokio::spawn(Arc::clone(&self).connection_io(
            websocket,
            outbound_rx,
            Arc::clone(&record),
        ));

        let registered = {
            let mut connections = self.connections.lock().unwrap();
            if self.shutdown.is_triggered() {
                false
            } else {
                connections.insert(
                    id.clone(),
                    ConnectionHandle {
                        record: Arc::clone(&record),
                        outbound: outbound_tx,
                        abort: io_task.abort_handle(),
                    },
                );
                true
            }
        };
        if !registered {
            // the listener began closing while this handshake was in
            // flight; no record may be created past that point
            io_task.abort();
            self.active_sessions.fetch_sub(1, Ordering::SeqCst);
            self.diag(
                LogLevel::Debug,
                "handshake",
                format!("discarding connection from {peer}: listener is closing"),
            );
            return;
        }

        self.diag(
            LogLevel::Info,
            "connection",
            format!(
                "connection {} open: {} from {}",
                record.serial, record.path, record.peer
            ),
        );
        if let Some(handler) = &self.handlers.open {
            handler(&record.path, &id);
        }

        let _ = io_task.await;

        self.finish_connection(&id);
        self.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }

    /// The connection's I/O loop: outbound queue, inbound drain, shutdown.
    /// Runs until the connection is done by either side, errors, or the
    /// task is aborted during a forced close.
    async fn connection_io<S>(
        self: Arc<Self>,
        websocket: tokio_tungstenite::WebSocketStream<S>,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        record: Arc<ConnectionRecord>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        let (mut sink, mut source) = websocket.split();
        let mut closing = self.shutdown.is_triggered();
        if closing && sink.send(Message::Close(None)).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                _ = shutdown_rx.recv(), if !closing => {
                    closing = true;
                    if sink.send(Message::Close(None)).await.is_err() {
                        break;
                    }
                }
                queued = outbound_rx.recv(), if !closing => match queued {
                    Some(outbound) => match sink.send(outbound.message).await {
                        Ok(()) => {
                            let _ = outbound.done.send(Ok(()));
                        }
                        Err(e) => {
                            self.diag(
                                LogLevel::Debug,
                                "connection",
                                format!("connection {} send failed: {e}", record.serial),
                            );
                            let _ = outbound.done.send(Err(SendError::Transport(e)));
                            break;
                        }
                    },
                    None => break,
                },
                inbound = source.next() => match inbound {
                    Some(Ok(Message::Close(_))) => {
                        if !closing {
                            let _ = sink.send(Message::Close(None)).await;
                        }
                        break;
                    }
                    Some(Ok(message)) => {
                        // no inbound delivery path; frames are drained so
                        // close frames and errors stay observable
                        tracing::trace!(
                            serial = record.serial,
                            bytes = message.len(),
                            "discarding inbound frame"
                        );
                    }
                    Some(Err(e)) => {
                        self.diag(
                            LogLevel::Debug,
                            "connection",
                            format!("connection {} errored: {e}", record.serial),
                        );
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    /// Remove the record and fire the close handler. Whoever removes the
    /// entry owns the notification, so it fires exactly once per
    /// connection.
    fn finish_connection(&self, id: &ConnectionId) {
        let removed = self.connections.lock().unwrap().remove(id);
        if let Some(handle) = removed {
            self.diag(
                LogLevel::Info,
                "connection",
                format!(
                    "connection {} closed: {}",
                    handle.record.serial, handle.record.path
                ),
            );
            if let Some(handler) = &self.handlers.close {
                handler(&handle.record.path, id);
            }
        }
    }

    /// Queue `message` on the identified connection and wait for the write.
    pub(crate) async fn send(&self, id: &ConnectionId, message: Message) -> Result<(), SendError> {
        // the lock covers only the lookup; transmission happens on the
        // connection's own session
        let outbound = {
            let connections = self.connections.lock().unwrap();
            match connections.get(id) {
                Some(handle) => handle.outbound.clone(),
                None => return Err(SendError::ConnectionNotFound),
            }
        };
        let (done_tx, done_rx) = oneshot::channel();
        outbound
            .send(Outbound {
                message,
                done: done_tx,
            })
            .map_err(|_| SendError::ConnectionNotFound)?;
        match done_rx.await {
            Ok(result) => result,
            // the session dropped its queue while closing
            Err(_) => Err(SendError::ConnectionClosed),
        }
    }

    /// Signal shutdown without waiting for quiescence. Used when the
    /// listener is dropped without an orderly close: the accept loop stops
    /// and sessions wind down in the background.
    pub(crate) fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Stop accepting, ask every session to close, wait for quiescence.
    /// Connections that do not drain within the close timeout have their
    /// I/O loops aborted; their sessions still run teardown, so every
    /// close handler fires exactly once either way.
    pub(crate) async fn close(&self) {
        self.shutdown.trigger();
        let accept_task = self.accept_task.lock().unwrap().take();
        if let Some(task) = accept_task {
            let _ = task.await;
        }

        if !self.drain(self.config.close_timeout()).await {
            // force-terminate the stragglers' I/O; the lock covers only
            // the snapshot, never the host's close handlers
            let stubborn: Vec<(u64, String, AbortHandle)> = {
                let connections = self.connections.lock().unwrap();
                connections
                    .values()
                    .map(|handle| {
                        (
                            handle.record.serial,
                            handle.record.path.clone(),
                            handle.abort.clone(),
                        )
                    })
                    .collect()
            };
            for (serial, path, abort) in stubborn {
                self.diag(
                    LogLevel::Warning,
                    "connection",
                    format!("connection {serial} force-closed: {path}"),
                );
                abort.abort();
            }
            // teardown after an abort is quick; a second timeout guards
            // against a close handler that never returns
            if !self.drain(self.config.close_timeout()).await {
                self.diag(
                    LogLevel::Warning,
                    "listener",
                    format!(
                        "{} connections still closing after forced termination",
                        self.active_sessions.load(Ordering::SeqCst)
                    ),
                );
            }
        }
    }

    /// Wait up to `limit` for all sessions to finish. True on quiescence.
    async fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.active_sessions.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }
        true
    }

    fn diag(&self, level: LogLevel, category: &'static str, message: String) {
        emit(self.config.log_callback(), level, category, message);
    }
}
