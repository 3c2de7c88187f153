//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → registry.rs (accept loop)
//!     → tls.rs (optional TLS handshake)
//!     → registry.rs (WebSocket upgrade, validate gate, session)
//!     → identity.rs (opaque handle the host addresses sends with)
//!
//! Connection lifecycle:
//!     Handshaking → Open → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - The registry is internal; hosts interact through the listener facade
//! - Identities reference records weakly and order by referent identity,
//!   so they stay comparable after the connection is gone
//! - TLS is optional and handled before the WebSocket upgrade

pub mod guard;
pub mod identity;
pub mod listener;
pub(crate) mod registry;
pub mod tls;
