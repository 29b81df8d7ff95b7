//! DHCP hardware type module.

use std::fmt;

/// The BOOTP `htype` field.
///
/// Only MAC-48 (Ethernet) is meaningfully distinguished; everything else
/// round-trips through `Undefined` with its original numeric value lost,
/// matching the rest of the header's "best-effort" decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareType {
    Undefined,
    Ethernet,
}

impl From<u8> for HardwareType {
    fn from(value: u8) -> Self {
        use self::HardwareType::*;
        match value {
            1 => Ethernet,
            _ => Undefined,
        }
    }
}

impl From<HardwareType> for u8 {
    fn from(value: HardwareType) -> Self {
        use self::HardwareType::*;
        match value {
            Undefined => 0,
            Ethernet => 1,
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::HardwareType::*;
        match self {
            Ethernet => write!(f, "Ethernet"),
            Undefined => write!(f, "UNDEFINED"),
        }
    }
}
