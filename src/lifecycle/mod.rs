//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Listener close():
//!     Shutdown triggered → accept loop stops → sessions close
//!     → connections drained → socket released
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: connections still open past the deadline are
//!   force-terminated

pub mod shutdown;

pub use shutdown::Shutdown;
