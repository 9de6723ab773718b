//! Device addresses.

use std::fmt;

/// A fixed 3-byte identifier for a device on the Insteon network.
///
/// Addresses are raw network-order bytes and are conventionally displayed
/// as colon-separated hex, e.g. `1A:2B:3C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 3]);

impl Address {
    /// Create an address from its three raw bytes.
    pub const fn new(high: u8, mid: u8, low: u8) -> Self {
        Self([high, mid, low])
    }

    /// The raw address bytes in wire order.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Decode an address from the first three bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than 3 bytes.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self([buf[0], buf[1], buf[2]])
    }
}

impl From<[u8; 3]> for Address {
    fn from(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_colon_separated_hex() {
        let addr = Address::new(0x01, 0xAB, 0x3C);
        assert_eq!(addr.to_string(), "01:AB:3C");
    }

    #[test]
    fn from_bytes_takes_prefix() {
        let addr = Address::from_bytes(&[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(addr, Address::new(0x11, 0x22, 0x33));
    }
}
