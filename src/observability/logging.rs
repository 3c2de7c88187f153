//! Structured logging and the host diagnostic sink.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the node binary
//! - Define the diagnostic entry shape handed to the host's log callback
//! - Emit listener events through tracing and the callback in one place
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Every operational event the listener reports goes through [`emit`], so
//!   a configured callback sees exactly what the tracing subscriber sees
//! - Log filter configurable via config and the RUST_LOG environment variable

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// A single diagnostic entry reported by the listener.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity of the event.
    pub level: LogLevel,
    /// Subsystem that produced the event (e.g. "listener", "connection").
    pub category: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Host-supplied diagnostic sink.
pub type LogCallback = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Initialize the tracing subscriber with an env-filter.
///
/// `default_filter` applies when RUST_LOG is unset.
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Emit one diagnostic event: a tracing event plus, when configured, the
/// host's log callback.
pub(crate) fn emit(
    callback: Option<&LogCallback>,
    level: LogLevel,
    category: &'static str,
    message: String,
) {
    match level {
        LogLevel::Error => tracing::error!(category, "{message}"),
        LogLevel::Warning => tracing::warn!(category, "{message}"),
        LogLevel::Info => tracing::info!(category, "{message}"),
        LogLevel::Debug => tracing::debug!(category, "{message}"),
        LogLevel::Trace => tracing::trace!(category, "{message}"),
    }
    if let Some(callback) = callback {
        callback(&LogEntry {
            level,
            category,
            message,
        });
    }
}
