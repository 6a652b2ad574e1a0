//! # bluewire
//!
//! Async client driver for the Bluetooth Attribute Protocol (ATT).
//!
//! A [`Session`] connects to a remote device, exchanges request/response
//! PDUs and surfaces notifications and indications as events. The
//! [`advert`] module decodes EIR advertisement payloads for discovery
//! ahead of connecting.
//!
//! ## Architecture
//!
//! - **Session task**: owns all connection state; the cloneable
//!   [`Session`] handle talks to it over channels
//! - **Dispatch**: unsolicited inbound PDUs route through a
//!   per-connection registration table
//! - **Transport**: pluggable seam carrying whole PDUs; a Unix socket
//!   implementation is provided
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bluewire::{Session, SessionConfig, SocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> bluewire::Result<()> {
//!     let transport = Arc::new(SocketTransport::new("/run/bluewired.sock"));
//!     let (events_tx, mut events) = tokio::sync::mpsc::channel(16);
//!     let (session, _task) = Session::spawn(transport, SessionConfig::default(), events_tx);
//!
//!     session.connect("AA:BB:CC:DD:EE:FF".parse()?, Default::default()).await?;
//!     let mtu = session.exchange_mtu(247).await?;
//!     let value = session.read_by_handle(0x002A).await?;
//!     Ok(())
//! }
//! ```

pub mod advert;
pub mod att;
pub mod dispatch;
pub mod error;
pub mod transport;

mod event;
mod session;

pub use advert::{AdvertisingReport, BdAddr, DiscoveryMode};
pub use error::{BluewireError, Result};
pub use event::{SessionEvent, SessionState, Status};
pub use session::{Session, SessionConfig};
pub use transport::{SecurityLevel, SocketTransport};
