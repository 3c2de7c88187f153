//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener internals produce diagnostic events:
//!     → logging.rs emit (structured tracing event)
//!     → host log callback, when one is configured
//!
//! Consumers:
//!     → tracing subscriber (stdout, initialized by the binary)
//!     → the embedding host's own logging subsystem (via the callback)
//! ```
//!
//! # Design Decisions
//! - One emit path, so the callback and the subscriber never disagree
//! - Entries carry severity, category, and message; no further structure

pub mod logging;
