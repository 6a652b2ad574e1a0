//! Reassembly buffer for length-prefixed ATT PDUs.
//!
//! The socket transport frames each PDU with a 2-byte big-endian length
//! prefix. Socket reads arrive in arbitrary chunks, so a state machine
//! accumulates bytes and yields complete PDUs:
//! - `WaitingForLength`: need the 2 prefix bytes
//! - `WaitingForPdu`: length known, need that many more bytes

use bytes::{Buf, Bytes, BytesMut};

use crate::att::MAX_LE_MTU;
use crate::error::{BluewireError, Result};

/// Bytes of length prefix ahead of each PDU.
pub const LENGTH_PREFIX_SIZE: usize = 2;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForLength,
    WaitingForPdu { remaining: usize },
}

/// Accumulates socket reads and extracts complete PDUs.
///
/// All data lives in one `BytesMut`; extracted PDUs are zero-copy
/// `split_to().freeze()` slices of it.
pub struct PduBuffer {
    buffer: BytesMut,
    state: State,
    max_pdu_len: usize,
}

impl PduBuffer {
    /// Buffer sized for the largest PDU an LE link can carry.
    pub fn new() -> Self {
        Self::with_max_pdu_len(MAX_LE_MTU as usize)
    }

    /// Buffer with a custom PDU size ceiling.
    pub fn with_max_pdu_len(max_pdu_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * (LENGTH_PREFIX_SIZE + max_pdu_len)),
            state: State::WaitingForLength,
            max_pdu_len,
        }
    }

    /// Push a chunk of socket data and extract every complete PDU.
    ///
    /// Partial data stays buffered for the next push. A declared length of
    /// zero (an ATT PDU always has an opcode) or above the ceiling is a
    /// protocol error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut pdus = Vec::new();
        while let Some(pdu) = self.try_extract_one()? {
            pdus.push(pdu);
        }
        Ok(pdus)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForLength => {
                if self.buffer.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }

                let declared = self.buffer.get_u16() as usize;
                if declared == 0 {
                    return Err(BluewireError::protocol("zero-length PDU frame"));
                }
                if declared > self.max_pdu_len {
                    return Err(BluewireError::protocol(format!(
                        "framed PDU of {declared} bytes exceeds maximum {}",
                        self.max_pdu_len
                    )));
                }

                self.state = State::WaitingForPdu { remaining: declared };
                self.try_extract_one()
            }

            State::WaitingForPdu { remaining } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let pdu = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForLength;
                Ok(Some(pdu))
            }
        }
    }

    /// Number of buffered bytes not yet part of an extracted PDU.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered data and reset the state machine.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }
}

impl Default for PduBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame one PDU with its length prefix.
pub(crate) fn frame_pdu(pdu: &[u8], out: &mut BytesMut) {
    out.extend_from_slice(&(pdu.len() as u16).to_be_bytes());
    out.extend_from_slice(pdu);
}
