//! Bluetooth device addresses and the textual ids derived from them.
//!
//! Addresses are stored the way the radio reports them: least-significant
//! byte first. Everything human-facing (Display, ids, config strings) is
//! most-significant byte first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of a Bluetooth device address in bytes.
pub const ADDR_LEN: usize = 6;

/// A 48-bit Bluetooth device address, little-endian as delivered by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; ADDR_LEN]);

/// Address type reported alongside every address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Self {
        if value == 0 {
            Self::Public
        } else {
            Self::Random
        }
    }

    /// Short prefix used in tag and locator ids.
    fn id_prefix(self) -> &'static str {
        match self {
            Self::Public => "pd",
            Self::Random => "sr",
        }
    }
}

impl BdAddr {
    /// Address bytes, most-significant first.
    pub fn to_be_bytes(self) -> [u8; ADDR_LEN] {
        let mut be = self.0;
        be.reverse();
        be
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let be = self.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            be[0], be[1], be[2], be[3], be[4], be[5]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device address '{0}': expected six ':'-separated hex octets")]
pub struct AddressParseError(pub String);

impl FromStr for BdAddr {
    type Err = AddressParseError;

    /// Parse `AA:BB:CC:DD:EE:FF` (most-significant byte first). `-` is also
    /// accepted as a separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError(s.to_string());
        let octets: Vec<&str> = s.trim().split(|c| c == ':' || c == '-').collect();
        if octets.len() != ADDR_LEN {
            return Err(err());
        }
        let mut bytes = [0u8; ADDR_LEN];
        for (i, octet) in octets.iter().enumerate() {
            let decoded = hex::decode(octet).map_err(|_| err())?;
            if decoded.len() != 1 {
                return Err(err());
            }
            // Textual form is big-endian; storage is little-endian.
            bytes[ADDR_LEN - 1 - i] = decoded[0];
        }
        Ok(Self(bytes))
    }
}

/// Id used for tags and for the locator itself in published results,
/// e.g. `ble-pd-0C4314F45E3A`.
pub fn device_id(addr: &BdAddr, address_type: AddressType) -> String {
    format!(
        "ble-{}-{}",
        address_type.id_prefix(),
        hex::encode_upper(addr.to_be_bytes())
    )
}
