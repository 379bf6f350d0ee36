//! Address Allocator
//!
//! Resolves a completed unique ID to a free node address, avoiding every
//! address already granted, every address observed live on the bus, and the
//! server's own address. Grants are idempotent for the lifetime of the
//! process: a replayed or retransmitted completion resolves to the address
//! granted the first time.

use crate::error::{Error, Result};
use crate::protocol::{NodeAddress, UniqueId, MAX_DYNAMIC_ADDR, MIN_DYNAMIC_ADDR};
use crate::registry::NodeRegistry;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Allocation Record
// =============================================================================

/// Record of a granted address
#[derive(Debug, Clone)]
pub struct AllocationRecord {
    /// Unique ID the grant belongs to
    pub unique_id: UniqueId,
    /// Address granted
    pub address: NodeAddress,
    /// When the grant was first made
    pub allocated_at: DateTime<Utc>,
}

// =============================================================================
// Address Allocator
// =============================================================================

/// Allocator granting node addresses for completed handshakes
///
/// The scan bounds replicate the deployed protocol exactly: the upward scan
/// stops short of the top of the range and the downward fallback stops short
/// of the bottom, so both boundary addresses stay out of dynamic grants.
pub struct AddressAllocator {
    /// Reference to the node registry (supplies the known-address set)
    registry: Arc<NodeRegistry>,
    /// The server's own address, never granted
    own_address: NodeAddress,
    /// Inclusive range configured for dynamic addresses
    range_low: u8,
    range_high: u8,
    /// Grants by unique ID, in grant order
    allocations: RwLock<IndexMap<UniqueId, AllocationRecord>>,
}

impl AddressAllocator {
    /// Create an allocator over the default dynamic range
    pub fn new(registry: Arc<NodeRegistry>, own_address: NodeAddress) -> Arc<Self> {
        // Bounds are the protocol defaults, already validated by type.
        Arc::new(Self {
            registry,
            own_address,
            range_low: MIN_DYNAMIC_ADDR,
            range_high: MAX_DYNAMIC_ADDR,
            allocations: RwLock::new(IndexMap::new()),
        })
    }

    /// Create an allocator over a custom dynamic range
    pub fn with_range(
        registry: Arc<NodeRegistry>,
        own_address: NodeAddress,
        range_low: u8,
        range_high: u8,
    ) -> Result<Arc<Self>> {
        NodeAddress::new(range_low)?;
        NodeAddress::new(range_high)?;
        if range_low >= range_high {
            return Err(Error::Configuration(format!(
                "Invalid dynamic address range: [{}, {}]",
                range_low, range_high
            )));
        }
        Ok(Arc::new(Self {
            registry,
            own_address,
            range_low,
            range_high,
            allocations: RwLock::new(IndexMap::new()),
        }))
    }

    /// Resolve a completed unique ID to a node address
    ///
    /// With a requested address, scans upward from it (top of range
    /// excluded); otherwise, or when the upward scan finds nothing, scans
    /// downward from the top (bottom of range excluded). The grant is
    /// recorded before the caller broadcasts it so a duplicate completion
    /// racing the broadcast still resolves idempotently.
    pub fn resolve(
        &self,
        unique_id: UniqueId,
        requested: Option<NodeAddress>,
    ) -> Result<NodeAddress> {
        let mut allocations = self.allocations.write();

        if let Some(record) = allocations.get(&unique_id) {
            debug!(
                address = record.address.get(),
                unique_id = %unique_id,
                "Unique ID already allocated, returning existing grant"
            );
            return Ok(record.address);
        }

        let mut excluded: HashSet<u8> = allocations
            .values()
            .map(|record| record.address.get())
            .collect();
        excluded.extend(
            self.registry
                .known_addresses()
                .iter()
                .map(|address| address.get()),
        );
        excluded.insert(self.own_address.get());

        let mut granted = None;

        if let Some(requested) = requested {
            for candidate in requested.get()..self.range_high {
                if !excluded.contains(&candidate) {
                    granted = Some(candidate);
                    break;
                }
            }
        }

        if granted.is_none() {
            for candidate in ((self.range_low + 1)..=self.range_high).rev() {
                if !excluded.contains(&candidate) {
                    granted = Some(candidate);
                    break;
                }
            }
        }

        match granted {
            Some(value) => {
                let address = NodeAddress::new(value)?;
                allocations.insert(
                    unique_id,
                    AllocationRecord {
                        unique_id,
                        address,
                        allocated_at: Utc::now(),
                    },
                );
                info!(
                    address = value,
                    unique_id = %unique_id,
                    "Allocated node address"
                );
                Ok(address)
            }
            None => Err(Error::AddressSpaceExhausted {
                low: self.range_low,
                high: self.range_high,
            }),
        }
    }

    /// Look up an existing grant without allocating
    pub fn lookup(&self, unique_id: &UniqueId) -> Option<NodeAddress> {
        self.allocations
            .read()
            .get(unique_id)
            .map(|record| record.address)
    }

    /// Snapshot of every grant, in grant order
    pub fn allocations(&self) -> Vec<AllocationRecord> {
        self.allocations.read().values().cloned().collect()
    }

    /// Number of grants made so far
    pub fn len(&self) -> usize {
        self.allocations.read().len()
    }

    /// Check if no grant has been made yet
    pub fn is_empty(&self) -> bool {
        self.allocations.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NodeStatus;

    fn addr(value: u8) -> NodeAddress {
        NodeAddress::new(value).unwrap()
    }

    fn id(seed: u8) -> UniqueId {
        UniqueId::from([seed; 16])
    }

    fn allocator_with_live(live: &[u8]) -> Arc<AddressAllocator> {
        let registry = NodeRegistry::new();
        for &address in live {
            registry.observe(addr(address), NodeStatus::with_uptime(1));
        }
        AddressAllocator::new(registry, addr(127))
    }

    #[test]
    fn test_requested_address_granted_when_free() {
        let allocator = allocator_with_live(&[1, 2, 3]);
        let granted = allocator.resolve(id(0x42), Some(addr(5))).unwrap();
        assert_eq!(granted.get(), 5);
        assert_eq!(allocator.lookup(&id(0x42)), Some(addr(5)));
    }

    #[test]
    fn test_repeated_completion_is_idempotent() {
        let allocator = allocator_with_live(&[1, 2, 3]);
        let first = allocator.resolve(id(0x42), Some(addr(5))).unwrap();
        let second = allocator.resolve(id(0x42), Some(addr(5))).unwrap();
        let third = allocator.resolve(id(0x42), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(allocator.len(), 1);
    }

    #[test]
    fn test_upward_scan_skips_occupied() {
        let allocator = allocator_with_live(&[5, 6]);
        let granted = allocator.resolve(id(0x01), Some(addr(5))).unwrap();
        assert_eq!(granted.get(), 7);
    }

    #[test]
    fn test_no_request_grants_highest_free() {
        // 127 is the server's own address, so the downward scan lands on 126.
        let allocator = allocator_with_live(&[]);
        let granted = allocator.resolve(id(0x01), None).unwrap();
        assert_eq!(granted.get(), 126);
    }

    #[test]
    fn test_upward_scan_excludes_top_of_range() {
        let registry = NodeRegistry::new();
        registry.observe(addr(9), NodeStatus::with_uptime(1));
        let allocator =
            AddressAllocator::with_range(registry, addr(127), 1, 10).unwrap();

        // Upward scan from 9 covers only {9}, which is taken; the downward
        // fallback then hands out the top of the range.
        let granted = allocator.resolve(id(0x01), Some(addr(9))).unwrap();
        assert_eq!(granted.get(), 10);
    }

    #[test]
    fn test_downward_scan_excludes_bottom_of_range() {
        let registry = NodeRegistry::new();
        registry.observe(addr(2), NodeStatus::with_uptime(1));
        registry.observe(addr(3), NodeStatus::with_uptime(1));
        let allocator =
            AddressAllocator::with_range(registry, addr(127), 1, 3).unwrap();

        // 2 and 3 are live and 1 is the excluded bottom bound.
        let err = allocator.resolve(id(0x01), None).unwrap_err();
        assert!(matches!(
            err,
            Error::AddressSpaceExhausted { low: 1, high: 3 }
        ));
        assert!(allocator.is_empty());
    }

    #[test]
    fn test_own_address_never_granted() {
        let registry = NodeRegistry::new();
        let allocator =
            AddressAllocator::with_range(registry, addr(10), 1, 10).unwrap();
        let granted = allocator.resolve(id(0x01), None).unwrap();
        assert_eq!(granted.get(), 9);
    }

    #[test]
    fn test_distinct_ids_get_distinct_addresses() {
        let allocator = allocator_with_live(&[]);
        let first = allocator.resolve(id(0x01), None).unwrap();
        let second = allocator.resolve(id(0x02), None).unwrap();
        assert_ne!(first, second);
        assert_eq!(allocator.len(), 2);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let registry = NodeRegistry::new();
        assert!(AddressAllocator::with_range(registry.clone(), addr(127), 10, 10).is_err());
        assert!(AddressAllocator::with_range(registry, addr(127), 0, 10).is_err());
    }
}
