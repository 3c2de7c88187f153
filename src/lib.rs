//! Server-side WebSocket listener.
//!
//! Binds one TCP port and accepts a dynamically changing set of concurrent
//! WebSocket connections, optionally secured with TLS. Pluggable handlers
//! gate acceptance and observe connection open/close; an asynchronous
//! `send` primitive addresses one specific connection through an opaque
//! [`ConnectionId`] that stays comparable even after that connection has
//! closed. Designed to be embedded in a larger host process (a
//! media-control node here) alongside its other services.
//!
//! # Architecture Overview
//!
//! ```text
//!  TCP accept ──▶ TLS handshake ──▶ WebSocket upgrade ──▶ validate_handler
//!                                                               │ accept
//!                                                               ▼
//!  close_handler ◀── session loop ◀── open_handler ◀── record + identity
//!        ▲               ▲
//!        │               │ FIFO outbound queue
//!   close()         send(id, message)
//! ```

// Core subsystems
pub mod config;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use net::guard::ListenerGuard;
pub use net::identity::ConnectionId;
pub use net::listener::{
    CloseHandler, Listener, ListenerConfig, ListenerError, ListenerState, OpenHandler, SendError,
    ValidateHandler,
};
pub use net::tls::{TlsContext, TlsContextCallback, TlsError};
pub use observability::logging::{LogCallback, LogEntry, LogLevel};

/// WebSocket message type, re-exported from the codec.
pub use tokio_tungstenite::tungstenite::Message;
