//! Advertisement module - EIR decoding and discovery filtering.
//!
//! Stateless: raw broadcast frames go in, structured
//! [`AdvertisingReport`] records come out. Independent of the session
//! and dispatch layers.

mod addr;
mod eir;
mod report;

pub use addr::{AddrParseError, AddressKind, BdAddr};
pub use eir::{decode_eir, AdFlags, EirField, EirFields};
pub use report::{AdvertisingReport, DiscoveryMode};
