//! PDU encoders and decoders.
//!
//! Requests this client sends and responses it awaits. All multi-byte
//! integers are little endian per the ATT wire format. Encoders return
//! freshly allocated, exactly sized buffers; decoders never index past
//! the input slice.

use crate::att::opcode::{opcodes, structural_min_len, ErrorCode};
use crate::att::uuid::AttUuid;
use crate::error::{BluewireError, Result};

/// One `(handle, value)` element from a Read By Type Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValue {
    /// Attribute handle the value belongs to.
    pub handle: u16,
    /// Attribute value bytes.
    pub value: Vec<u8>,
}

/// Decoded ATT Error Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResp {
    /// Opcode of the request that failed.
    pub request: u8,
    /// Attribute handle the error refers to.
    pub handle: u16,
    /// Error code.
    pub code: ErrorCode,
}

fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn check_min(opcode: u8, pdu: &[u8]) -> Result<()> {
    let min = structural_min_len(opcode)
        .ok_or_else(|| BluewireError::protocol(format!("unknown opcode {opcode:#04x}")))?;
    if pdu.len() < min {
        return Err(BluewireError::protocol(format!(
            "PDU for opcode {opcode:#04x} is {} bytes, minimum is {min}",
            pdu.len()
        )));
    }
    if pdu[0] != opcode {
        return Err(BluewireError::protocol(format!(
            "expected opcode {opcode:#04x}, got {:#04x}",
            pdu[0]
        )));
    }
    Ok(())
}

// --- encoders -------------------------------------------------------------

/// Exchange MTU Request: `[0x02, mtu_lo, mtu_hi]`.
pub fn encode_mtu_req(client_rx_mtu: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(3);
    pdu.push(opcodes::MTU_REQ);
    pdu.extend_from_slice(&client_rx_mtu.to_le_bytes());
    pdu
}

/// Read Request: `[0x0A, handle]`.
pub fn encode_read_req(handle: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(3);
    pdu.push(opcodes::READ_REQ);
    pdu.extend_from_slice(&handle.to_le_bytes());
    pdu
}

/// Read By Type Request: `[0x08, start, end, uuid]`.
pub fn encode_read_by_type_req(start: u16, end: u16, uuid: AttUuid) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5 + uuid.wire_len());
    pdu.push(opcodes::READ_BY_TYPE_REQ);
    pdu.extend_from_slice(&start.to_le_bytes());
    pdu.extend_from_slice(&end.to_le_bytes());
    uuid.encode_into(&mut pdu);
    pdu
}

/// Write Request: `[0x12, handle, value]`.
pub fn encode_write_req(handle: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(3 + value.len());
    pdu.push(opcodes::WRITE_REQ);
    pdu.extend_from_slice(&handle.to_le_bytes());
    pdu.extend_from_slice(value);
    pdu
}

/// Write Command: `[0x52, handle, value]`. No response is defined.
pub fn encode_write_cmd(handle: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(3 + value.len());
    pdu.push(opcodes::WRITE_CMD);
    pdu.extend_from_slice(&handle.to_le_bytes());
    pdu.extend_from_slice(value);
    pdu
}

/// Handle Value Confirmation: `[0x1E]`. Sent after every indication.
pub fn encode_confirmation() -> Vec<u8> {
    vec![opcodes::HANDLE_CNF]
}

/// Error Response: `[0x01, request_opcode, handle, code]`.
pub fn encode_error_resp(request: u8, handle: u16, code: ErrorCode) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(opcodes::ERROR_RESP);
    pdu.push(request);
    pdu.extend_from_slice(&handle.to_le_bytes());
    pdu.push(code.to_raw());
    pdu
}

// --- decoders -------------------------------------------------------------

/// Decode an Exchange MTU Response into the server's receive MTU.
pub fn decode_mtu_resp(pdu: &[u8]) -> Result<u16> {
    check_min(opcodes::MTU_RESP, pdu)?;
    Ok(get_u16(pdu, 1))
}

/// Decode a Read Response into the attribute value bytes.
pub fn decode_read_resp(pdu: &[u8]) -> Result<Vec<u8>> {
    check_min(opcodes::READ_RESP, pdu)?;
    Ok(pdu[1..].to_vec())
}

/// Decode a Read By Type Response into `(handle, value)` pairs.
///
/// The response declares one element length for the whole list; each
/// element is a 2-byte handle followed by `len - 2` value bytes. A list
/// that does not divide evenly is a protocol error.
pub fn decode_read_by_type_resp(pdu: &[u8]) -> Result<Vec<TypedValue>> {
    check_min(opcodes::READ_BY_TYPE_RESP, pdu)?;
    let elem_len = pdu[1] as usize;
    if elem_len < 2 {
        return Err(BluewireError::protocol(format!(
            "read-by-type element length {elem_len} is below the 2-byte handle"
        )));
    }
    let list = &pdu[2..];
    if list.is_empty() || list.len() % elem_len != 0 {
        return Err(BluewireError::protocol(format!(
            "read-by-type list of {} bytes does not divide into {elem_len}-byte elements",
            list.len()
        )));
    }
    Ok(list
        .chunks_exact(elem_len)
        .map(|chunk| TypedValue {
            handle: get_u16(chunk, 0),
            value: chunk[2..].to_vec(),
        })
        .collect())
}

/// Check whether a PDU acknowledges a write: a Write Response or an
/// Execute Write Response, both bare opcodes.
pub fn is_write_ack(pdu: &[u8]) -> bool {
    matches!(
        pdu.first(),
        Some(&opcodes::WRITE_RESP) | Some(&opcodes::EXEC_WRITE_RESP)
    )
}

/// Decode an Error Response.
pub fn decode_error_resp(pdu: &[u8]) -> Result<ErrorResp> {
    check_min(opcodes::ERROR_RESP, pdu)?;
    Ok(ErrorResp {
        request: pdu[1],
        handle: get_u16(pdu, 2),
        code: ErrorCode::from_raw(pdu[4]),
    })
}
