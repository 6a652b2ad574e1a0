//! ATT protocol module - opcodes, PDU encoding/decoding, attribute UUIDs.
//!
//! Implements the wire layer of the Attribute Protocol:
//! - opcode constants and structural minimum lengths
//! - request encoders and response decoders
//! - 16- and 128-bit attribute UUIDs (little endian on the wire)

mod opcode;
mod pdu;
mod uuid;

pub use opcode::{opcodes, structural_min_len, ErrorCode, DEFAULT_LE_MTU, MAX_LE_MTU};
pub use pdu::{
    decode_error_resp, decode_mtu_resp, decode_read_by_type_resp, decode_read_resp,
    encode_confirmation, encode_error_resp, encode_mtu_req, encode_read_by_type_req,
    encode_read_req, encode_write_cmd, encode_write_req, is_write_ack, ErrorResp, TypedValue,
};
pub use uuid::AttUuid;
