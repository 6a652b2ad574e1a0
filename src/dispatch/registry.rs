//! Registration table for inbound PDUs.
//!
//! Built once when a session connects, discarded on disconnect. Each
//! entry binds `(opcode, handle range)` to a handler; at most one entry
//! matches any `(opcode, handle)` pair.

use bytes::Bytes;
use tracing::debug;

use crate::att::{opcodes, structural_min_len};
use crate::dispatch::handlers::{
    DispatchOutcome, EventHandler, InboundHandler, RejectHandler, SilentHandler,
};
use crate::error::{BluewireError, Result};

/// Inclusive attribute handle range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRange {
    start: u16,
    end: u16,
}

impl HandleRange {
    /// Range covering `[start, end]`.
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// The wildcard: every handle.
    pub fn any() -> Self {
        Self {
            start: 0,
            end: u16::MAX,
        }
    }

    /// Whether `handle` falls inside this range.
    pub fn contains(&self, handle: u16) -> bool {
        self.start <= handle && handle <= self.end
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

struct Registration {
    opcode: u8,
    range: HandleRange,
    handler: Box<dyn InboundHandler>,
}

/// Dispatch table for inbound PDUs.
pub struct Registry {
    entries: Vec<Registration>,
}

impl Registry {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Bind `(opcode, range)` to `handler`.
    ///
    /// Entries for the same opcode must not overlap in range; the first
    /// match wins at dispatch, so an overlap would shadow a registration.
    pub fn register(&mut self, opcode: u8, range: HandleRange, handler: Box<dyn InboundHandler>) {
        debug_assert!(
            !self
                .entries
                .iter()
                .any(|e| e.opcode == opcode && e.range.overlaps(&range)),
            "overlapping registration for opcode {opcode:#04x}"
        );
        self.entries.push(Registration {
            opcode,
            range,
            handler,
        });
    }

    /// The standard client-role table.
    ///
    /// Peer events turn into application events, server-initiated
    /// requests are answered as unsupported, and responseless commands
    /// are swallowed. Response opcodes are absent: the session resolves
    /// those against its pending operation before consulting the table.
    pub fn for_client() -> Self {
        let mut registry = Self::new();
        let any = HandleRange::any();

        registry.register(
            opcodes::HANDLE_NOTIFY,
            any,
            Box::new(EventHandler { indication: false }),
        );
        registry.register(
            opcodes::HANDLE_IND,
            any,
            Box::new(EventHandler { indication: true }),
        );

        for opcode in [
            opcodes::FIND_INFO_REQ,
            opcodes::FIND_BY_TYPE_REQ,
            opcodes::READ_BY_TYPE_REQ,
            opcodes::READ_REQ,
            opcodes::READ_BLOB_REQ,
            opcodes::READ_MULTI_REQ,
            opcodes::READ_BY_GROUP_REQ,
            opcodes::WRITE_REQ,
            opcodes::PREP_WRITE_REQ,
        ] {
            registry.register(opcode, any, Box::new(RejectHandler { takes_handle: true }));
        }
        // Execute write carries no target handle.
        registry.register(
            opcodes::EXEC_WRITE_REQ,
            any,
            Box::new(RejectHandler {
                takes_handle: false,
            }),
        );

        registry.register(opcodes::WRITE_CMD, any, Box::new(SilentHandler));
        registry.register(opcodes::SIGNED_WRITE_CMD, any, Box::new(SilentHandler));

        registry
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatch one inbound PDU.
    ///
    /// `Ok(None)` means no registration matched and the frame was
    /// dropped. `Err(Protocol)` means the frame was shorter than its
    /// opcode's structural minimum; the caller disconnects the session.
    pub fn dispatch(&self, pdu: &Bytes) -> Result<Option<DispatchOutcome>> {
        let opcode = match pdu.first() {
            Some(op) => *op,
            None => return Err(BluewireError::protocol("empty PDU")),
        };

        let Some(min) = structural_min_len(opcode) else {
            debug!(opcode = format_args!("{opcode:#04x}"), "unknown opcode, frame dropped");
            return Ok(None);
        };
        if pdu.len() < min {
            return Err(BluewireError::protocol(format!(
                "PDU for opcode {opcode:#04x} is {} bytes, minimum is {min}",
                pdu.len()
            )));
        }

        // Range matching keys on the handle field every dispatched PDU
        // with one carries at bytes 1..3; handleless PDUs key on 0.
        let handle = if pdu.len() >= 3 {
            u16::from_le_bytes([pdu[1], pdu[2]])
        } else {
            0
        };

        match self
            .entries
            .iter()
            .find(|e| e.opcode == opcode && e.range.contains(handle))
        {
            Some(entry) => entry.handler.handle(pdu).map(Some),
            None => {
                debug!(
                    opcode = format_args!("{opcode:#04x}"),
                    handle, "no registration, frame dropped"
                );
                Ok(None)
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
