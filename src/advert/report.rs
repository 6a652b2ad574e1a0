//! Advertising reports and discovery filtering.

use serde::Serialize;

use crate::advert::addr::{AddressKind, BdAddr};
use crate::advert::eir::{decode_eir, AdFlags, EirField};

/// One advertising broadcast from a remote device, decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvertisingReport {
    /// Advertiser's device address.
    pub address: BdAddr,
    /// Address kind reported alongside the address.
    pub address_kind: AddressKind,
    /// Received signal strength in dBm.
    pub rssi: i8,
    /// Decoded EIR fields, in buffer order.
    pub fields: Vec<EirField>,
    /// True when the EIR data was cut short mid-field.
    pub truncated: bool,
}

impl AdvertisingReport {
    /// Decode the EIR bytes of a broadcast into a report.
    pub fn decode(address: BdAddr, address_kind: AddressKind, rssi: i8, eir: &[u8]) -> Self {
        let decoded = decode_eir(eir);
        Self {
            address,
            address_kind,
            rssi,
            fields: decoded.fields,
            truncated: decoded.truncated,
        }
    }

    /// The advertised local name, preferring the complete form over the
    /// shortened one.
    pub fn local_name(&self) -> Option<&[u8]> {
        let mut short = None;
        for field in &self.fields {
            match field {
                EirField::NameComplete(name) => return Some(name),
                EirField::NameShort(name) => short = Some(name.as_slice()),
                _ => {}
            }
        }
        short
    }

    /// The flags field, if advertised.
    pub fn flags(&self) -> Option<AdFlags> {
        self.fields.iter().find_map(|f| match f {
            EirField::Flags(flags) => Some(*flags),
            _ => None,
        })
    }

    /// All advertised 16-bit service UUIDs, complete and incomplete lists
    /// combined. 32-bit and 128-bit lists are not folded in; read them
    /// from [`AdvertisingReport::fields`] directly.
    pub fn service_uuids(&self) -> Vec<u16> {
        let mut out = Vec::new();
        for field in &self.fields {
            if let EirField::Uuid16List { uuids, .. } = field {
                out.extend_from_slice(uuids);
            }
        }
        out
    }

    /// Manufacturer-specific data, if advertised.
    pub fn manufacturer_data(&self) -> Option<(u16, &[u8])> {
        self.fields.iter().find_map(|f| match f {
            EirField::ManufacturerData { company, data } => Some((*company, data.as_slice())),
            _ => None,
        })
    }
}

/// Discovery filter applied to advertising reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// No filtering, every report passes.
    #[default]
    None,
    /// Only devices flagged limited discoverable.
    Limited,
    /// Devices flagged limited or general discoverable.
    General,
}

impl DiscoveryMode {
    /// Whether a report passes this filter. A report with no flags field
    /// fails both discoverable modes.
    pub fn passes(&self, report: &AdvertisingReport) -> bool {
        match self {
            Self::None => true,
            Self::Limited => report
                .flags()
                .is_some_and(|f| f.limited_discoverable()),
            Self::General => report
                .flags()
                .is_some_and(|f| f.limited_discoverable() || f.general_discoverable()),
        }
    }
}
