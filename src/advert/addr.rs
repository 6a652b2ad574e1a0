//! Device addresses.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A 48-bit device address, stored in display order
/// (`bytes[0]` is the leftmost octet of `AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BdAddr(pub [u8; 6]);

/// Address kind declared alongside the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Public (IEEE-assigned) address.
    #[default]
    Public,
    /// Random (static or private) address.
    Random,
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Error parsing a textual device address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrParseError(String);

impl fmt::Display for AddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid device address: {}", self.0)
    }
}

impl std::error::Error for AddrParseError {}

impl FromStr for BdAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| AddrParseError(s.to_string()))?;
            if part.len() != 2 {
                return Err(AddrParseError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddrParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(AddrParseError(s.to_string()));
        }
        Ok(BdAddr(bytes))
    }
}
