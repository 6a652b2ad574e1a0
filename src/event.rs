//! Session events and status snapshots.

use bytes::Bytes;
use serde::Serialize;

use crate::advert::{AddressKind, BdAddr};
use crate::transport::SecurityLevel;

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No channel, no pending operation.
    #[default]
    Disconnected,
    /// Channel being established.
    Connecting,
    /// Channel up, PDUs flowing.
    Connected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot of a session's observable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Connection state.
    pub state: SessionState,
    /// Remote address, present unless `Disconnected`.
    pub remote: Option<BdAddr>,
    /// Remote address kind.
    pub addr_kind: AddressKind,
    /// Negotiated MTU; 0 until an MTU exchange completes.
    pub mtu: u16,
    /// Security level in effect.
    pub security: SecurityLevel,
}

/// Asynchronous events delivered on the channel supplied at spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session's observable state changed.
    StatusChanged(Status),
    /// Handle Value Notification from the peer.
    Notification {
        /// Attribute handle the value belongs to.
        handle: u16,
        /// Notified value bytes.
        value: Bytes,
    },
    /// Handle Value Indication from the peer. The confirmation has
    /// already been queued by the time this is delivered.
    Indication {
        /// Attribute handle the value belongs to.
        handle: u16,
        /// Indicated value bytes.
        value: Bytes,
    },
    /// A `connect` attempt failed; the session is `Disconnected` again.
    ConnectFailed {
        /// Human-readable failure cause.
        reason: String,
    },
    /// An inbound frame violated the protocol and the session
    /// disconnected itself.
    ProtocolViolation {
        /// Human-readable violation description.
        reason: String,
    },
}
