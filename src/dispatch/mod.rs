//! Dispatch module - routing for unsolicited inbound PDUs.
//!
//! Responses the session is actively waiting on never reach this layer;
//! everything else (peer events, server-initiated requests, commands)
//! goes through the [`Registry`] built at connect time.

mod handlers;
mod registry;

pub use handlers::{DispatchOutcome, EventHandler, InboundHandler, RejectHandler, SilentHandler};
pub use registry::{HandleRange, Registry};
