//! Inbound PDU handlers.
//!
//! Handlers are pure: they decode a PDU and describe what should happen
//! as a [`DispatchOutcome`]. The session loop performs the actual I/O,
//! so handlers never touch the channel and are trivially testable.

use bytes::Bytes;

use crate::att::{encode_confirmation, encode_error_resp, ErrorCode};
use crate::error::Result;
use crate::event::SessionEvent;

/// What the session should do with a dispatched PDU.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// PDU to queue on the channel, if any.
    pub reply: Option<Bytes>,
    /// Event to deliver to the application, if any.
    pub event: Option<SessionEvent>,
}

impl DispatchOutcome {
    /// Nothing to do.
    pub fn none() -> Self {
        Self::default()
    }
}

/// A handler for one class of inbound PDU.
///
/// The registry guarantees `pdu` meets the opcode's structural minimum
/// length before a handler runs.
pub trait InboundHandler: Send + Sync {
    /// Decode `pdu` and describe the outcome.
    fn handle(&self, pdu: &Bytes) -> Result<DispatchOutcome>;
}

fn handle_at(pdu: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([pdu[at], pdu[at + 1]])
}

/// Handle Value Notification / Indication handler.
///
/// Extracts `(handle, value)` into an application event. An indication
/// additionally queues the confirmation the protocol requires.
pub struct EventHandler {
    /// True for indications (0x1D), false for notifications (0x1B).
    pub indication: bool,
}

impl InboundHandler for EventHandler {
    fn handle(&self, pdu: &Bytes) -> Result<DispatchOutcome> {
        let handle = handle_at(pdu, 1);
        let value = pdu.slice(3..);

        let (event, reply) = if self.indication {
            (
                SessionEvent::Indication { handle, value },
                Some(Bytes::from(encode_confirmation())),
            )
        } else {
            (SessionEvent::Notification { handle, value }, None)
        };

        Ok(DispatchOutcome {
            reply,
            event: Some(event),
        })
    }
}

/// Handler for server-initiated requests this client does not serve.
///
/// Answers on the wire with an Error Response carrying
/// `RequestNotSupported`, addressed to the handle the request targeted.
/// Nothing is raised locally.
pub struct RejectHandler {
    /// False for requests carrying no target handle (execute write);
    /// those are answered with handle 0.
    pub takes_handle: bool,
}

impl InboundHandler for RejectHandler {
    fn handle(&self, pdu: &Bytes) -> Result<DispatchOutcome> {
        let request = pdu[0];
        let handle = if self.takes_handle { handle_at(pdu, 1) } else { 0 };

        let reply = encode_error_resp(request, handle, ErrorCode::RequestNotSupported);
        Ok(DispatchOutcome {
            reply: Some(Bytes::from(reply)),
            event: None,
        })
    }
}

/// Handler for commands the protocol defines no response for
/// (write command, signed write command). Decoded for shape, then
/// dropped.
pub struct SilentHandler;

impl InboundHandler for SilentHandler {
    fn handle(&self, _pdu: &Bytes) -> Result<DispatchOutcome> {
        Ok(DispatchOutcome::none())
    }
}
