//! EIR field decoding.
//!
//! An EIR buffer is a sequence of `[len, type, payload...]` fields where
//! `len` counts the type byte plus the payload. A zero length byte
//! terminates the significant part. The decoder walks the buffer with a
//! bounds-checked cursor and never reads past the caller's slice, even
//! when the declared lengths are adversarial. A field whose declared span
//! overruns the buffer stops the walk and marks the result truncated;
//! fields decoded before that point remain valid.

use serde::Serialize;

/// AD type values (Bluetooth Assigned Numbers).
mod ad_types {
    pub const FLAGS: u8 = 0x01;
    pub const UUID16_SOME: u8 = 0x02;
    pub const UUID16_ALL: u8 = 0x03;
    pub const UUID32_SOME: u8 = 0x04;
    pub const UUID32_ALL: u8 = 0x05;
    pub const UUID128_SOME: u8 = 0x06;
    pub const UUID128_ALL: u8 = 0x07;
    pub const NAME_SHORT: u8 = 0x08;
    pub const NAME_COMPLETE: u8 = 0x09;
    pub const TX_POWER: u8 = 0x0A;
    pub const SLAVE_CONN_INTERVAL: u8 = 0x12;
    pub const APPEARANCE: u8 = 0x19;
    pub const MANUFACTURER_SPECIFIC: u8 = 0xFF;
}

/// Flags AD field bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdFlags(pub u8);

impl AdFlags {
    /// Bit 0: LE limited discoverable mode.
    pub const LIMITED_MODE: u8 = 0x01;
    /// Bit 1: LE general discoverable mode.
    pub const GENERAL_MODE: u8 = 0x02;

    /// Limited discoverable bit set.
    pub fn limited_discoverable(&self) -> bool {
        self.0 & Self::LIMITED_MODE != 0
    }

    /// General discoverable bit set.
    pub fn general_discoverable(&self) -> bool {
        self.0 & Self::GENERAL_MODE != 0
    }
}

/// One decoded EIR field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EirField {
    /// Flags bitmap (first payload byte; extra bytes are permitted and
    /// ignored).
    Flags(AdFlags),
    /// Shortened local name, raw bytes (UTF-8 by convention, not enforced).
    NameShort(Vec<u8>),
    /// Complete local name, raw bytes.
    NameComplete(Vec<u8>),
    /// 16-bit service UUID list. `complete` distinguishes the
    /// all-listed form from the more-available form.
    Uuid16List { complete: bool, uuids: Vec<u16> },
    /// 32-bit service UUID list.
    Uuid32List { complete: bool, uuids: Vec<u32> },
    /// 128-bit service UUID list, each entry in display order.
    Uuid128List { complete: bool, uuids: Vec<[u8; 16]> },
    /// Transmit power level in dBm.
    TxPower(i8),
    /// Appearance category code.
    Appearance(u16),
    /// Peripheral preferred connection interval, in 1.25 ms units.
    SlaveConnInterval { min: u16, max: u16 },
    /// Manufacturer-specific data: company identifier plus payload.
    ManufacturerData { company: u16, data: Vec<u8> },
    /// Any tag this decoder does not interpret; retained, never dropped.
    Unknown { ad_type: u8, data: Vec<u8> },
}

/// Result of decoding one EIR buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EirFields {
    /// Fields in buffer order.
    pub fields: Vec<EirField>,
    /// True when a declared field span ran past the end of the buffer.
    pub truncated: bool,
}

/// Cursor over an EIR buffer that only advances by verified spans.
struct EirCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> EirCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Take the next `(type, payload)` field, or `None` at the terminator
    /// or end of buffer. `Some(Err(()))` means the declared span overruns
    /// the buffer.
    fn next_field(&mut self) -> Option<std::result::Result<(u8, &'a [u8]), ()>> {
        if self.offset >= self.buf.len() {
            return None;
        }
        let field_len = self.buf[self.offset] as usize;
        if field_len == 0 {
            // End of the significant part.
            return None;
        }
        let end = self.offset + 1 + field_len;
        if end > self.buf.len() {
            return Some(Err(()));
        }
        let ad_type = self.buf[self.offset + 1];
        let payload = &self.buf[self.offset + 2..end];
        self.offset = end;
        Some(Ok((ad_type, payload)))
    }
}

fn uuid16_list(payload: &[u8], complete: bool) -> EirField {
    let uuids = payload
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    EirField::Uuid16List { complete, uuids }
}

fn uuid32_list(payload: &[u8], complete: bool) -> EirField {
    let uuids = payload
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    EirField::Uuid32List { complete, uuids }
}

fn uuid128_list(payload: &[u8], complete: bool) -> EirField {
    let uuids = payload
        .chunks_exact(16)
        .map(|c| {
            let mut uuid = [0u8; 16];
            // Wire order is little endian; store display order.
            for (i, b) in c.iter().rev().enumerate() {
                uuid[i] = *b;
            }
            uuid
        })
        .collect();
    EirField::Uuid128List { complete, uuids }
}

fn decode_field(ad_type: u8, payload: &[u8]) -> EirField {
    use ad_types::*;
    match ad_type {
        FLAGS if !payload.is_empty() => EirField::Flags(AdFlags(payload[0])),
        NAME_SHORT => EirField::NameShort(payload.to_vec()),
        NAME_COMPLETE => EirField::NameComplete(payload.to_vec()),
        UUID16_SOME => uuid16_list(payload, false),
        UUID16_ALL => uuid16_list(payload, true),
        UUID32_SOME => uuid32_list(payload, false),
        UUID32_ALL => uuid32_list(payload, true),
        UUID128_SOME => uuid128_list(payload, false),
        UUID128_ALL => uuid128_list(payload, true),
        TX_POWER if !payload.is_empty() => EirField::TxPower(payload[0] as i8),
        APPEARANCE if payload.len() >= 2 => {
            EirField::Appearance(u16::from_le_bytes([payload[0], payload[1]]))
        }
        SLAVE_CONN_INTERVAL if payload.len() >= 4 => EirField::SlaveConnInterval {
            min: u16::from_le_bytes([payload[0], payload[1]]),
            max: u16::from_le_bytes([payload[2], payload[3]]),
        },
        MANUFACTURER_SPECIFIC if payload.len() >= 2 => EirField::ManufacturerData {
            company: u16::from_le_bytes([payload[0], payload[1]]),
            data: payload[2..].to_vec(),
        },
        other => EirField::Unknown {
            ad_type: other,
            data: payload.to_vec(),
        },
    }
}

/// Decode an EIR buffer into structured fields.
///
/// Decoding cannot fail: a truncated buffer yields the fields decoded so
/// far with `truncated` set, and uninterpretable tags land in
/// [`EirField::Unknown`].
pub fn decode_eir(buf: &[u8]) -> EirFields {
    let mut cursor = EirCursor::new(buf);
    let mut fields = Vec::new();
    let mut truncated = false;

    while let Some(next) = cursor.next_field() {
        match next {
            Ok((ad_type, payload)) => fields.push(decode_field(ad_type, payload)),
            Err(()) => {
                truncated = true;
                break;
            }
        }
    }

    EirFields { fields, truncated }
}
