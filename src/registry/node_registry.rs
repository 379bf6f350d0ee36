//! Node Status Registry
//!
//! Tracks the last-known status and last-seen time of every node observed on
//! the bus, decides when a node's descriptive info needs refreshing, and
//! records info responses as they arrive. The set of known addresses feeds
//! the allocator's collision avoidance.

use crate::protocol::{NodeAddress, NodeInfo, NodeStatus};
use crate::registry::RegistryEvent;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::info;

// =============================================================================
// Constants
// =============================================================================

/// Default silence window after which a reappearing node is refreshed
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Refresh Decision
// =============================================================================

/// Outcome of a status observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Address never seen before
    FirstSeen,
    /// Address silent for longer than the status timeout
    TimedOut,
    /// Uptime counter decreased: the node rebooted
    Restarted,
    /// Nothing notable, stored state refreshed in place
    UpToDate,
}

impl RefreshDecision {
    /// Whether the caller should issue a descriptive-info request
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, RefreshDecision::UpToDate)
    }
}

// =============================================================================
// Node Entry
// =============================================================================

/// Per-address registry state
#[derive(Debug, Clone)]
pub struct NodeEntry {
    /// Last received status payload
    pub status: NodeStatus,
    /// Monotonic time of the last status broadcast
    pub last_seen: Instant,
    /// Wall-clock time the address was first observed
    pub first_seen_at: DateTime<Utc>,
    /// Last recorded descriptive info, if any response ever arrived
    pub info: Option<NodeInfo>,
    /// Wall-clock time the info was recorded
    pub info_recorded_at: Option<DateTime<Utc>>,
}

impl NodeEntry {
    fn new(status: NodeStatus, now: Instant) -> Self {
        Self {
            status,
            last_seen: now,
            first_seen_at: Utc::now(),
            info: None,
            info_recorded_at: None,
        }
    }
}

/// Callback invoked after descriptive info is recorded for an address
pub type NewNodeCallback = Box<dyn Fn(&NodeRegistry, NodeAddress, &NodeInfo) + Send + Sync>;

// =============================================================================
// Node Registry
// =============================================================================

/// Registry of every node address observed on the bus
///
/// Entries are created on first observation and never removed; a long
/// silence is a liveness signal for consumers, not a deletion trigger.
pub struct NodeRegistry {
    /// Observed nodes by address
    entries: RwLock<HashMap<NodeAddress, NodeEntry>>,
    /// Silence window treated as "gone and came back"
    status_timeout: Duration,
    /// Invoked after each recorded info response
    new_node_callback: RwLock<Option<NewNodeCallback>>,
    /// Event broadcaster
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl NodeRegistry {
    /// Create a registry with the default 30 s status timeout
    pub fn new() -> Arc<Self> {
        Self::with_timeout(DEFAULT_STATUS_TIMEOUT)
    }

    /// Create a registry with a custom status timeout
    pub fn with_timeout(status_timeout: Duration) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(256);
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            status_timeout,
            new_node_callback: RwLock::new(None),
            event_sender,
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Install the callback invoked after info is recorded for an address
    pub fn set_new_node_callback(&self, callback: NewNodeCallback) {
        *self.new_node_callback.write() = Some(callback);
    }

    /// Record a status broadcast and decide whether to refresh node info
    pub fn observe(&self, source: NodeAddress, status: NodeStatus) -> RefreshDecision {
        self.observe_at(source, status, Instant::now())
    }

    /// Time-parameterized form of [`observe`](Self::observe)
    pub fn observe_at(
        &self,
        source: NodeAddress,
        status: NodeStatus,
        now: Instant,
    ) -> RefreshDecision {
        let decision = {
            let mut entries = self.entries.write();
            match entries.entry(source) {
                Entry::Vacant(slot) => {
                    slot.insert(NodeEntry::new(status, now));
                    RefreshDecision::FirstSeen
                }
                Entry::Occupied(mut slot) => {
                    let entry = slot.get_mut();
                    let decision = if status.uptime_secs < entry.status.uptime_secs {
                        RefreshDecision::Restarted
                    } else if now.duration_since(entry.last_seen) > self.status_timeout {
                        RefreshDecision::TimedOut
                    } else {
                        RefreshDecision::UpToDate
                    };
                    entry.status = status;
                    entry.last_seen = now;
                    decision
                }
            }
        };

        let event = match decision {
            RefreshDecision::FirstSeen => Some(RegistryEvent::NodeObserved { address: source }),
            RefreshDecision::TimedOut => Some(RegistryEvent::NodeReturned { address: source }),
            RefreshDecision::Restarted => Some(RegistryEvent::NodeRestarted {
                address: source,
                uptime_secs: status.uptime_secs,
            }),
            RefreshDecision::UpToDate => None,
        };
        if let Some(event) = event {
            let _ = self.event_sender.send(event);
        }

        decision
    }

    /// Record a descriptive-info response for an address
    ///
    /// Stores the info, emits the structured discovery log line, and invokes
    /// the new-node callback if one is installed.
    pub fn record_info(&self, source: NodeAddress, info: NodeInfo) {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .entry(source)
                .or_insert_with(|| NodeEntry::new(NodeStatus::with_uptime(0), Instant::now()));
            entry.info = Some(info.clone());
            entry.info_recorded_at = Some(Utc::now());
        }

        let vcs_commit = format!("{:08x}", info.software.vcs_commit);
        let image_crc = format!("{:016X}", info.software.image_crc);
        let hardware_unique_id = info.hardware.unique_id_hex();
        info!(
            address = source.get(),
            software_major = info.software.major,
            software_minor = info.software.minor,
            %vcs_commit,
            %image_crc,
            hardware_major = info.hardware.major,
            hardware_minor = info.hardware.minor,
            %hardware_unique_id,
            name = %info.name,
            "Recorded node info"
        );

        let _ = self.event_sender.send(RegistryEvent::InfoRecorded {
            address: source,
            name: info.name.clone(),
        });

        let callback = self.new_node_callback.read();
        if let Some(callback) = callback.as_ref() {
            callback(self, source, &info);
        }
    }

    /// All addresses ever observed on the bus
    pub fn known_addresses(&self) -> Vec<NodeAddress> {
        self.entries.read().keys().copied().collect()
    }

    /// Check if an address has been observed
    pub fn contains(&self, address: NodeAddress) -> bool {
        self.entries.read().contains_key(&address)
    }

    /// Get the registry entry for an address
    pub fn get(&self, address: NodeAddress) -> Option<NodeEntry> {
        self.entries.read().get(&address).cloned()
    }

    /// Last recorded status payload for an address
    pub fn status(&self, address: NodeAddress) -> Option<NodeStatus> {
        self.entries.read().get(&address).map(|entry| entry.status)
    }

    /// Last recorded descriptive info for an address
    pub fn info(&self, address: NodeAddress) -> Option<NodeInfo> {
        self.entries
            .read()
            .get(&address)
            .and_then(|entry| entry.info.clone())
    }

    /// Number of observed addresses
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no address has been observed yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HardwareVersion, SoftwareVersion};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(value: u8) -> NodeAddress {
        NodeAddress::new(value).unwrap()
    }

    fn sample_info(name: &str) -> NodeInfo {
        NodeInfo {
            software: SoftwareVersion {
                major: 1,
                minor: 4,
                vcs_commit: 0xDEADBEEF,
                image_crc: 0x0123_4567_89AB_CDEF,
            },
            hardware: HardwareVersion {
                major: 2,
                minor: 0,
                unique_id: Bytes::from_static(&[0x11; 16]),
            },
            name: name.to_string(),
        }
    }

    #[test]
    fn test_first_observation_needs_refresh() {
        let registry = NodeRegistry::new();
        let decision = registry.observe(addr(9), NodeStatus::with_uptime(10));
        assert_eq!(decision, RefreshDecision::FirstSeen);
        assert!(decision.needs_refresh());
    }

    #[test]
    fn test_steady_status_is_up_to_date() {
        let registry = NodeRegistry::new();
        let now = Instant::now();
        registry.observe_at(addr(9), NodeStatus::with_uptime(10), now);

        let decision = registry.observe_at(
            addr(9),
            NodeStatus::with_uptime(11),
            now + Duration::from_secs(1),
        );
        assert_eq!(decision, RefreshDecision::UpToDate);
        assert!(!decision.needs_refresh());
    }

    #[test]
    fn test_uptime_decrease_detects_restart() {
        let registry = NodeRegistry::new();
        let now = Instant::now();
        registry.observe_at(addr(9), NodeStatus::with_uptime(100), now);

        let decision = registry.observe_at(
            addr(9),
            NodeStatus::with_uptime(50),
            now + Duration::from_secs(1),
        );
        assert_eq!(decision, RefreshDecision::Restarted);
        assert!(decision.needs_refresh());
    }

    #[test]
    fn test_silence_past_timeout_needs_refresh() {
        let registry = NodeRegistry::new();
        let now = Instant::now();
        registry.observe_at(addr(9), NodeStatus::with_uptime(10), now);

        let decision = registry.observe_at(
            addr(9),
            NodeStatus::with_uptime(45),
            now + Duration::from_secs(31),
        );
        assert_eq!(decision, RefreshDecision::TimedOut);
        assert!(decision.needs_refresh());
    }

    #[test]
    fn test_observation_overwrites_status() {
        let registry = NodeRegistry::new();
        registry.observe(addr(3), NodeStatus::with_uptime(10));
        registry.observe(addr(3), NodeStatus::with_uptime(20));
        assert_eq!(registry.status(addr(3)).unwrap().uptime_secs, 20);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_record_info_invokes_callback() {
        let registry = NodeRegistry::new();
        registry.observe(addr(7), NodeStatus::with_uptime(5));

        static CALLS: AtomicUsize = AtomicUsize::new(0);
        registry.set_new_node_callback(Box::new(|registry, address, info| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            assert_eq!(address.get(), 7);
            assert_eq!(info.name, "io.px4.sapog");
            assert!(registry.contains(address));
        }));

        registry.record_info(addr(7), sample_info("io.px4.sapog"));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(registry.info(addr(7)).unwrap().name, "io.px4.sapog");
    }

    #[test]
    fn test_known_addresses() {
        let registry = NodeRegistry::new();
        registry.observe(addr(1), NodeStatus::with_uptime(1));
        registry.observe(addr(2), NodeStatus::with_uptime(1));
        registry.observe(addr(3), NodeStatus::with_uptime(1));

        let mut known = registry.known_addresses();
        known.sort();
        assert_eq!(
            known.iter().map(|a| a.get()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_registry_events() {
        let registry = NodeRegistry::new();
        let mut events = registry.subscribe();

        registry.observe(addr(5), NodeStatus::with_uptime(10));
        registry.observe(addr(5), NodeStatus::with_uptime(2));

        assert_matches::assert_matches!(
            events.try_recv().unwrap(),
            RegistryEvent::NodeObserved { address } if address.get() == 5
        );
        assert_matches::assert_matches!(
            events.try_recv().unwrap(),
            RegistryEvent::NodeRestarted { address, uptime_secs: 2 } if address.get() == 5
        );
    }
}
