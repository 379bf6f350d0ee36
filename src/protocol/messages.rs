//! Protocol message shapes
//!
//! Transport-agnostic forms of the broadcasts consumed and produced by the
//! allocation server. Binary framing and bus arbitration live behind the
//! transport port; these types only carry the decoded fields.

use super::types::{NodeAddress, Severity, UniqueId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// =============================================================================
// Node Status
// =============================================================================

/// Periodic status payload broadcast by every live node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Seconds since the node booted
    pub uptime_secs: u32,
    /// Health code (0 = ok)
    pub health: u8,
    /// Operating mode code
    pub mode: u8,
    /// Vendor-specific status bits
    pub vendor_status: u16,
}

impl NodeStatus {
    /// Status payload with a given uptime and nominal health/mode
    pub fn with_uptime(uptime_secs: u32) -> Self {
        Self {
            uptime_secs,
            health: 0,
            mode: 0,
            vendor_status: 0,
        }
    }
}

/// Inbound status broadcast from a live node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBroadcast {
    /// Address the status came from
    pub source: NodeAddress,
    /// Reported status payload
    pub status: NodeStatus,
}

// =============================================================================
// Allocation Handshake
// =============================================================================

/// One fragment of the three-stage unique-ID handshake
///
/// Fragments carry 6, 6, and 4 bytes of the unique ID in stage order. Only
/// the third fragment's `requested_address` is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationFragment {
    /// Set on the fragment that opens a new handshake
    pub first_part: bool,
    /// Unique-ID bytes carried by this fragment
    pub unique_id: Bytes,
    /// Address the device would like, if any (third stage only)
    pub requested_address: Option<NodeAddress>,
}

impl AllocationFragment {
    /// Fragment opening a new handshake
    pub fn first(unique_id: impl Into<Bytes>) -> Self {
        Self {
            first_part: true,
            unique_id: unique_id.into(),
            requested_address: None,
        }
    }

    /// Follow-up fragment for an in-flight handshake
    pub fn followup(
        unique_id: impl Into<Bytes>,
        requested_address: Option<NodeAddress>,
    ) -> Self {
        Self {
            first_part: false,
            unique_id: unique_id.into(),
            requested_address,
        }
    }
}

/// Outbound allocation broadcast: per-stage echo or final grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationBroadcast {
    /// Always false on server broadcasts
    pub first_part: bool,
    /// Granted address; `None` (wire 0) on stage echoes
    pub address: Option<NodeAddress>,
    /// Unique-ID bytes accumulated so far, full 16 on a grant
    pub unique_id: Bytes,
}

impl AllocationBroadcast {
    /// Echo of the bytes accumulated so far, confirming the stage to the
    /// requesting device
    pub fn echo(accumulated: Bytes) -> Self {
        Self {
            first_part: false,
            address: None,
            unique_id: accumulated,
        }
    }

    /// Final grant carrying the full unique ID
    pub fn grant(address: NodeAddress, unique_id: UniqueId) -> Self {
        Self {
            first_part: false,
            address: Some(address),
            unique_id: Bytes::copy_from_slice(unique_id.as_bytes()),
        }
    }
}

// =============================================================================
// Node Info
// =============================================================================

/// Software revision block from a node-info response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareVersion {
    pub major: u8,
    pub minor: u8,
    /// VCS commit the image was built from
    pub vcs_commit: u32,
    /// Checksum of the firmware image
    pub image_crc: u64,
}

/// Hardware revision block from a node-info response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareVersion {
    pub major: u8,
    pub minor: u8,
    /// Hardware-burned unique identifier
    pub unique_id: Bytes,
}

impl HardwareVersion {
    /// Upper-case hex rendering of the hardware unique ID
    pub fn unique_id_hex(&self) -> String {
        self.unique_id
            .iter()
            .map(|byte| format!("{:02X}", byte))
            .collect()
    }
}

/// Descriptive info a node returns when asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub software: SoftwareVersion,
    pub hardware: HardwareVersion,
    /// Human-readable node name
    pub name: String,
}

// =============================================================================
// Log Broadcast
// =============================================================================

/// Structured log line broadcast by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBroadcast {
    /// Address the log line came from
    pub source: NodeAddress,
    /// Component name on the sending node
    pub source_name: String,
    /// Log text
    pub text: String,
    /// Severity of the line
    pub severity: Severity,
}

// =============================================================================
// Bus Event Stream
// =============================================================================

/// One inbound event on the serialized processing stream
///
/// All state mutation is driven by a single consumer draining these in
/// arrival order; info responses are delivered here as well so they never
/// race the handshake state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Periodic status broadcast from a live node
    Status(StatusBroadcast),
    /// Handshake fragment from an unidentified device
    Fragment(AllocationFragment),
    /// Log line from a node
    Log(LogBroadcast),
    /// Response to an earlier descriptive-info request
    Info {
        source: NodeAddress,
        info: NodeInfo,
    },
}

impl BusEvent {
    /// Short label for tracing
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::Status(_) => "status",
            BusEvent::Fragment(_) => "fragment",
            BusEvent::Log(_) => "log",
            BusEvent::Info { .. } => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_carries_no_address() {
        let echo = AllocationBroadcast::echo(Bytes::from_static(&[1, 2, 3, 4, 5, 6]));
        assert!(!echo.first_part);
        assert_eq!(echo.address, None);
        assert_eq!(echo.unique_id.len(), 6);
    }

    #[test]
    fn test_grant_carries_full_id() {
        let id = UniqueId::from([7u8; 16]);
        let address = NodeAddress::new(42).unwrap();
        let grant = AllocationBroadcast::grant(address, id);
        assert_eq!(grant.address, Some(address));
        assert_eq!(grant.unique_id.as_ref(), id.as_bytes());
    }

    #[test]
    fn test_hardware_unique_id_hex() {
        let hardware = HardwareVersion {
            major: 1,
            minor: 0,
            unique_id: Bytes::from_static(&[0x0A, 0xFF, 0x00]),
        };
        assert_eq!(hardware.unique_id_hex(), "0AFF00");
    }

    #[test]
    fn test_event_kind() {
        let event = BusEvent::Fragment(AllocationFragment::first(vec![0u8; 6]));
        assert_eq!(event.kind(), "fragment");
    }
}
