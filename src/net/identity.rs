//! Opaque connection identity with owner-based ordering.
//!
//! # Responsibilities
//! - Name one accepted connection without owning its lifetime
//! - Provide a strict total order that stays defined after the connection
//!   record is gone
//! - Stay usable as an ordered-map key

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use crate::net::registry::ConnectionRecord;

/// Opaque identity of one accepted connection.
///
/// Holds a weak reference to the registry's control record for the
/// connection. Two identities are equal exactly when they refer to the same
/// record, and the ordering compares the identity of that record, never its
/// contents: the weak reference keeps the record's allocation reserved, so
/// comparisons stay well-defined and stable after the connection has closed.
/// The default value refers to nothing, orders below every attached
/// identity, and is never handed out by the listener.
///
/// Usable as a key in ordered containers (`BTreeMap`, `BTreeSet`). There is
/// deliberately no `Hash` impl: no constant hash can be defined over a
/// referent that may already be gone.
#[derive(Debug, Clone, Default)]
pub struct ConnectionId {
    record: Option<Weak<ConnectionRecord>>,
}

impl ConnectionId {
    /// Mint the identity for a live record. Registry-internal: the only way
    /// for callers to obtain an attached identity is through the open
    /// handler.
    pub(crate) fn attached(record: &Arc<ConnectionRecord>) -> Self {
        Self {
            record: Some(Arc::downgrade(record)),
        }
    }

    /// Address of the referenced allocation; `None` for the null identity.
    fn referent(&self) -> Option<usize> {
        self.record.as_ref().map(|weak| Weak::as_ptr(weak) as usize)
    }
}

impl PartialEq for ConnectionId {
    fn eq(&self, other: &Self) -> bool {
        self.referent() == other.referent()
    }
}

impl Eq for ConnectionId {}

impl PartialOrd for ConnectionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConnectionId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Option's ordering makes the null identity the distinguished minimum
        self.referent().cmp(&other.referent())
    }
}
