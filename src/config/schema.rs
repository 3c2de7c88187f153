//! Configuration schema definitions.
//!
//! This module defines the node configuration structure. All types derive
//! Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// WebSocket listener settings (port, TLS).
    pub listener: ListenerSettings,

    /// Observability settings.
    pub observability: ObservabilitySettings,
}

/// WebSocket listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerSettings {
    /// Port to listen on. 0 binds an OS-assigned ephemeral port.
    pub port: u16,

    /// Serve wss:// instead of ws://.
    pub secure: bool,

    /// Path to the certificate chain file (PEM). Required when secure.
    pub cert_path: Option<String>,

    /// Path to the private key file (PEM). Required when secure.
    pub key_path: Option<String>,

    /// Bound on each connection's TLS and WebSocket handshakes.
    pub handshake_timeout_secs: u64,

    /// Bound on connection draining during close.
    pub close_timeout_secs: u64,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            secure: false,
            cert_path: None,
            key_path: None,
            handshake_timeout_secs: 10,
            close_timeout_secs: 5,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Default tracing filter; RUST_LOG overrides it.
    pub log_filter: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
        }
    }
}
