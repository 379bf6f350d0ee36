//! Core protocol types
//!
//! Bounded node addresses, the 16-byte unique hardware identifier assembled
//! over the three-stage handshake, and the log severity scale shared with
//! devices on the bus.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Length of a fully assembled unique ID
pub const UNIQUE_ID_LEN: usize = 16;

/// Fragment length carried by the first and second handshake stages
pub const LONG_FRAGMENT_LEN: usize = 6;

/// Fragment length carried by the third handshake stage
pub const SHORT_FRAGMENT_LEN: usize = 4;

/// Lowest dynamically allocatable node address
pub const MIN_DYNAMIC_ADDR: u8 = 1;

/// Highest dynamically allocatable node address
pub const MAX_DYNAMIC_ADDR: u8 = 127;

/// Wire value for "no address" (broadcast requester / echo)
pub const UNASSIGNED_ADDR: u8 = 0;

// =============================================================================
// Node Address
// =============================================================================

/// A validated node address on the bus
///
/// Addresses live in `[MIN_DYNAMIC_ADDR, MAX_DYNAMIC_ADDR]`; the wire value
/// 0 is reserved for unassigned devices and echo broadcasts and is modeled
/// as `Option::<NodeAddress>::None` throughout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct NodeAddress(u8);

impl NodeAddress {
    /// Lowest allocatable address
    pub const MIN: NodeAddress = NodeAddress(MIN_DYNAMIC_ADDR);

    /// Highest allocatable address
    pub const MAX: NodeAddress = NodeAddress(MAX_DYNAMIC_ADDR);

    /// Create an address, rejecting values outside the allocatable range
    pub fn new(value: u8) -> Result<Self> {
        if (MIN_DYNAMIC_ADDR..=MAX_DYNAMIC_ADDR).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange { address: value })
        }
    }

    /// Decode a wire byte, mapping 0 and out-of-range values to `None`
    pub fn from_wire(value: u8) -> Option<Self> {
        Self::new(value).ok()
    }

    /// Raw address value
    #[inline]
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for NodeAddress {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NodeAddress> for u8 {
    fn from(address: NodeAddress) -> u8 {
        address.0
    }
}

/// Wire encoding for an optional address (`None` encodes as 0)
pub fn address_to_wire(address: Option<NodeAddress>) -> u8 {
    address.map(|a| a.get()).unwrap_or(UNASSIGNED_ADDR)
}

// =============================================================================
// Unique ID
// =============================================================================

/// 16-byte hardware-derived identifier a device presents to obtain an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueId([u8; UNIQUE_ID_LEN]);

impl UniqueId {
    /// Build from exactly 16 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; UNIQUE_ID_LEN] =
            bytes
                .try_into()
                .map_err(|_| Error::InvalidUniqueIdLength {
                    expected: UNIQUE_ID_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; UNIQUE_ID_LEN] {
        &self.0
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl From<[u8; UNIQUE_ID_LEN]> for UniqueId {
    fn from(raw: [u8; UNIQUE_ID_LEN]) -> Self {
        Self(raw)
    }
}

// =============================================================================
// Log Severity
// =============================================================================

/// Severity scale used by device log broadcasts
///
/// Wire codes 0..=3. Decoding is fallible so an out-of-range code surfaces
/// as a structured error instead of an out-of-bounds dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Decode a wire severity code
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Severity::Debug),
            1 => Ok(Severity::Info),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::Error),
            _ => Err(Error::UnknownSeverity { code }),
        }
    }

    /// Wire code for this severity
    pub fn code(&self) -> u8 {
        match self {
            Severity::Debug => 0,
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_bounds() {
        assert!(NodeAddress::new(MIN_DYNAMIC_ADDR).is_ok());
        assert!(NodeAddress::new(MAX_DYNAMIC_ADDR).is_ok());
        assert!(NodeAddress::new(0).is_err());
        assert!(NodeAddress::new(128).is_err());
    }

    #[test]
    fn test_address_wire_mapping() {
        assert_eq!(NodeAddress::from_wire(0), None);
        assert_eq!(NodeAddress::from_wire(200), None);
        assert_eq!(NodeAddress::from_wire(5).map(|a| a.get()), Some(5));

        assert_eq!(address_to_wire(None), UNASSIGNED_ADDR);
        assert_eq!(address_to_wire(NodeAddress::from_wire(42)), 42);
    }

    #[test]
    fn test_unique_id_length_check() {
        let err = UniqueId::from_bytes(&[0u8; 12]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidUniqueIdLength { expected: 16, actual: 12 }
        ));

        let id = UniqueId::from_bytes(&[0xABu8; 16]).unwrap();
        assert_eq!(id.as_bytes(), &[0xAB; 16]);
    }

    #[test]
    fn test_unique_id_hex_display() {
        let mut raw = [0u8; 16];
        raw[0] = 0x01;
        raw[15] = 0xFF;
        let id = UniqueId::from(raw);
        let hex = id.to_string();
        assert_eq!(hex.len(), 32);
        assert!(hex.starts_with("01"));
        assert!(hex.ends_with("FF"));
    }

    #[test]
    fn test_severity_codes() {
        for code in 0..=3u8 {
            let severity = Severity::from_code(code).unwrap();
            assert_eq!(severity.code(), code);
        }
        assert!(matches!(
            Severity::from_code(4),
            Err(Error::UnknownSeverity { code: 4 })
        ));
    }
}
