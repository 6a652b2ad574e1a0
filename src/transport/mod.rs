//! Transport module - the seam between the session and the link layer.
//!
//! A [`Transport`] opens a [`Channel`] to a remote device. The channel
//! carries whole ATT PDUs in both directions; framing and reassembly are
//! the transport's problem, the session only ever sees complete PDUs.
//! [`SocketTransport`] is the concrete implementation speaking
//! length-prefixed ATT over a Unix socket; tests substitute their own.

mod framing;
mod socket;
mod writer;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::advert::{AddressKind, BdAddr};
use crate::error::Result;

pub use framing::PduBuffer;
pub use socket::SocketTransport;
pub use writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Boxed future type for trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Link security level requested for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// No encryption or authentication.
    #[default]
    Low,
    /// Encryption without MITM protection.
    Medium,
    /// Authenticated encryption.
    High,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Everything a transport needs to open a channel.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Remote device address.
    pub remote: BdAddr,
    /// Remote address kind.
    pub addr_kind: AddressKind,
    /// Security level to apply at channel open.
    pub security: SecurityLevel,
    /// Receive MTU the caller intends to negotiate, as a sizing hint.
    pub mtu_hint: u16,
}

/// An open channel plus the inbound PDU stream feeding off it.
///
/// The receiver yields one complete PDU per item; it closing means the
/// channel is gone.
pub struct Connection {
    /// Outbound half.
    pub channel: Box<dyn Channel>,
    /// Inbound PDU stream.
    pub inbound: mpsc::Receiver<Bytes>,
}

/// Outbound half of an open channel.
pub trait Channel: Send + Sync {
    /// Queue one complete PDU for transmission.
    fn send(&self, pdu: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Apply a security level to the live channel.
    fn set_security_level(&self, level: SecurityLevel) -> BoxFuture<'_, Result<()>>;
}

/// Factory for channels to remote devices.
pub trait Transport: Send + Sync {
    /// Open a channel to the device named in `params`.
    fn connect(&self, params: ConnectParams) -> BoxFuture<'_, Result<Connection>>;
}
