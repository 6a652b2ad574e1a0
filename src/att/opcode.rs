//! ATT opcode constants and per-opcode structural minimums.
//!
//! Opcode values follow the Bluetooth Core Specification, Vol 3 Part F.
//! `structural_min_len` is the shortest well-formed PDU for an opcode;
//! anything shorter is a protocol violation.

use std::fmt;

use serde::Serialize;

/// Default ATT_MTU for an LE link before any exchange.
pub const DEFAULT_LE_MTU: u16 = 23;

/// Largest MTU a client may request.
pub const MAX_LE_MTU: u16 = 517;

/// ATT opcode values.
pub mod opcodes {
    /// Error Response.
    pub const ERROR_RESP: u8 = 0x01;
    /// Exchange MTU Request.
    pub const MTU_REQ: u8 = 0x02;
    /// Exchange MTU Response.
    pub const MTU_RESP: u8 = 0x03;
    /// Find Information Request.
    pub const FIND_INFO_REQ: u8 = 0x04;
    /// Find By Type Value Request.
    pub const FIND_BY_TYPE_REQ: u8 = 0x06;
    /// Read By Type Request.
    pub const READ_BY_TYPE_REQ: u8 = 0x08;
    /// Read By Type Response.
    pub const READ_BY_TYPE_RESP: u8 = 0x09;
    /// Read Request.
    pub const READ_REQ: u8 = 0x0A;
    /// Read Response.
    pub const READ_RESP: u8 = 0x0B;
    /// Read Blob Request.
    pub const READ_BLOB_REQ: u8 = 0x0C;
    /// Read Multiple Request.
    pub const READ_MULTI_REQ: u8 = 0x0E;
    /// Read By Group Type Request.
    pub const READ_BY_GROUP_REQ: u8 = 0x10;
    /// Write Request.
    pub const WRITE_REQ: u8 = 0x12;
    /// Write Response.
    pub const WRITE_RESP: u8 = 0x13;
    /// Prepare Write Request.
    pub const PREP_WRITE_REQ: u8 = 0x16;
    /// Execute Write Request.
    pub const EXEC_WRITE_REQ: u8 = 0x18;
    /// Execute Write Response.
    pub const EXEC_WRITE_RESP: u8 = 0x19;
    /// Handle Value Notification.
    pub const HANDLE_NOTIFY: u8 = 0x1B;
    /// Handle Value Indication.
    pub const HANDLE_IND: u8 = 0x1D;
    /// Handle Value Confirmation.
    pub const HANDLE_CNF: u8 = 0x1E;
    /// Write Command (no response defined).
    pub const WRITE_CMD: u8 = 0x52;
    /// Signed Write Command (no response defined).
    pub const SIGNED_WRITE_CMD: u8 = 0xD2;
}

/// Structural minimum PDU length for an opcode, or `None` when the opcode
/// is not one this client decodes.
pub fn structural_min_len(opcode: u8) -> Option<usize> {
    use opcodes::*;
    let min = match opcode {
        ERROR_RESP => 5,
        MTU_REQ | MTU_RESP => 3,
        FIND_INFO_REQ => 5,
        FIND_BY_TYPE_REQ => 7,
        READ_BY_TYPE_REQ => 7,
        READ_BY_TYPE_RESP => 2,
        READ_REQ => 3,
        READ_RESP => 1,
        READ_BLOB_REQ => 5,
        READ_MULTI_REQ => 5,
        READ_BY_GROUP_REQ => 7,
        WRITE_REQ | WRITE_CMD => 3,
        WRITE_RESP => 1,
        PREP_WRITE_REQ => 5,
        EXEC_WRITE_REQ => 2,
        EXEC_WRITE_RESP => 1,
        HANDLE_NOTIFY | HANDLE_IND => 3,
        HANDLE_CNF => 1,
        SIGNED_WRITE_CMD => 15,
        _ => return None,
    };
    Some(min)
}

/// ATT Error Response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// 0x01 - attribute handle out of range.
    InvalidHandle,
    /// 0x02 - attribute cannot be read.
    ReadNotPermitted,
    /// 0x03 - attribute cannot be written.
    WriteNotPermitted,
    /// 0x04 - the request PDU was invalid.
    InvalidPdu,
    /// 0x05 - authentication required.
    InsufficientAuthentication,
    /// 0x06 - the server does not support the request.
    RequestNotSupported,
    /// 0x07 - offset past the end of the attribute.
    InvalidOffset,
    /// 0x08 - authorization required.
    InsufficientAuthorization,
    /// 0x0A - no attribute within the given range.
    AttributeNotFound,
    /// Any code this client does not name.
    Other(u8),
}

impl ErrorCode {
    /// Decode from the wire byte.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x01 => Self::InvalidHandle,
            0x02 => Self::ReadNotPermitted,
            0x03 => Self::WriteNotPermitted,
            0x04 => Self::InvalidPdu,
            0x05 => Self::InsufficientAuthentication,
            0x06 => Self::RequestNotSupported,
            0x07 => Self::InvalidOffset,
            0x08 => Self::InsufficientAuthorization,
            0x0A => Self::AttributeNotFound,
            other => Self::Other(other),
        }
    }

    /// Encode to the wire byte.
    pub fn to_raw(self) -> u8 {
        match self {
            Self::InvalidHandle => 0x01,
            Self::ReadNotPermitted => 0x02,
            Self::WriteNotPermitted => 0x03,
            Self::InvalidPdu => 0x04,
            Self::InsufficientAuthentication => 0x05,
            Self::RequestNotSupported => 0x06,
            Self::InvalidOffset => 0x07,
            Self::InsufficientAuthorization => 0x08,
            Self::AttributeNotFound => 0x0A,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::ReadNotPermitted => write!(f, "read not permitted"),
            Self::WriteNotPermitted => write!(f, "write not permitted"),
            Self::InvalidPdu => write!(f, "invalid PDU"),
            Self::InsufficientAuthentication => write!(f, "insufficient authentication"),
            Self::RequestNotSupported => write!(f, "request not supported"),
            Self::InvalidOffset => write!(f, "invalid offset"),
            Self::InsufficientAuthorization => write!(f, "insufficient authorization"),
            Self::AttributeNotFound => write!(f, "attribute not found"),
            Self::Other(raw) => write!(f, "error code {raw:#04x}"),
        }
    }
}
