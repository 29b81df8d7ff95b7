//! Client hardware address identity.

use std::fmt;

/// An opaque client hardware address (`chaddr`), typically 6 bytes for
/// Ethernet but stored without any length assumption.
///
/// This is the stable key lease records are indexed by (§3). Two
/// addresses of different lengths are never equal, and the canonical
/// textual form is lowercase hex with `:` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HwAddr(Vec<u8>);

impl HwAddr {
    /// Builds a hardware address from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        HwAddr(bytes.into())
    }

    /// Raw octets of the address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Canonical lowercase hex-with-colons representation, e.g. `aa:bb:cc:dd:ee:ff`.
    pub fn to_hex_string(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl From<Vec<u8>> for HwAddr {
    fn from(bytes: Vec<u8>) -> Self {
        HwAddr(bytes)
    }
}

impl From<&[u8]> for HwAddr {
    fn from(bytes: &[u8]) -> Self {
        HwAddr(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_lowercase_hex() {
        let hwaddr = HwAddr::new(vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        assert_eq!(hwaddr.to_hex_string(), "aa:bb:cc:dd:ee:01");
    }

    #[test]
    fn different_lengths_are_not_equal() {
        assert_ne!(HwAddr::new(vec![1, 2]), HwAddr::new(vec![1, 2, 0]));
    }
}
