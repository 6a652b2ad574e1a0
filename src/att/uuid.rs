//! Attribute UUIDs.
//!
//! ATT carries either a 16-bit assigned UUID or a full 128-bit UUID,
//! little endian on the wire.

use std::fmt;

use serde::Serialize;

/// A 16- or 128-bit attribute UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttUuid {
    /// 16-bit assigned number.
    Uuid16(u16),
    /// Full 128-bit UUID, stored big endian (display order).
    Uuid128([u8; 16]),
}

impl AttUuid {
    /// Wire length in bytes.
    pub fn wire_len(&self) -> usize {
        match self {
            Self::Uuid16(_) => 2,
            Self::Uuid128(_) => 16,
        }
    }

    /// Append the little-endian wire form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Uuid16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Uuid128(bytes) => out.extend(bytes.iter().rev()),
        }
    }
}

impl From<u16> for AttUuid {
    fn from(v: u16) -> Self {
        Self::Uuid16(v)
    }
}

impl fmt::Display for AttUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid16(v) => write!(f, "{v:#06x}"),
            Self::Uuid128(b) => write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-\
                 {:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12],
                b[13], b[14], b[15]
            ),
        }
    }
}
