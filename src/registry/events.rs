//! Registry Events
//!
//! Events emitted by the node registry for external consumers to react to
//! node lifecycle changes on the bus.

use crate::protocol::NodeAddress;
use serde::{Deserialize, Serialize};

/// Events emitted by the node registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// An address was observed for the first time
    NodeObserved { address: NodeAddress },

    /// An address reappeared after falling silent past the status timeout
    NodeReturned { address: NodeAddress },

    /// A node's uptime counter went backwards (reboot inferred)
    NodeRestarted {
        address: NodeAddress,
        uptime_secs: u32,
    },

    /// Descriptive info arrived and was recorded for an address
    InfoRecorded { address: NodeAddress, name: String },
}

impl RegistryEvent {
    /// Get the address associated with this event
    pub fn address(&self) -> NodeAddress {
        match self {
            RegistryEvent::NodeObserved { address } => *address,
            RegistryEvent::NodeReturned { address } => *address,
            RegistryEvent::NodeRestarted { address, .. } => *address,
            RegistryEvent::InfoRecorded { address, .. } => *address,
        }
    }

    /// Check if this event marks a node that needs an info refresh
    pub fn is_refresh_trigger(&self) -> bool {
        matches!(
            self,
            RegistryEvent::NodeObserved { .. }
                | RegistryEvent::NodeReturned { .. }
                | RegistryEvent::NodeRestarted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_address() {
        let address = NodeAddress::new(9).unwrap();
        let event = RegistryEvent::NodeRestarted {
            address,
            uptime_secs: 50,
        };
        assert_eq!(event.address(), address);
        assert!(event.is_refresh_trigger());

        let event = RegistryEvent::InfoRecorded {
            address,
            name: "io.px4.sapog".to_string(),
        };
        assert!(!event.is_refresh_trigger());
    }
}
